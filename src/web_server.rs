use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    serve, Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::chat::{PendingSubmission, Session};
use crate::constants;
use crate::events::{apply_client_event, parse_client_event, Outcome, ServerEvent};
use crate::llm_interaction::{CompletionClient, CompletionError};

type Completed = (PendingSubmission, Result<String, CompletionError>);

// Shared application state. Holds no chat state: each connection owns its session.
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    client: Arc<dyn CompletionClient>,
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => constants::PAGE_TITLE,
                    topics => constants::TOPICS,
                    selected_topic => constants::default_topic(),
                    model => state.client.model(),
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type WsSender = SplitSink<WebSocket, Message>;

async fn send_event(sender: &mut WsSender, event: &ServerEvent<'_>) -> Result<()> {
    let json_msg = serde_json::to_string(event).context("Failed to serialize server event")?;
    sender
        .send(Message::Text(json_msg))
        .await
        .context("Failed to send WebSocket message")
}

fn dispatch(client: Arc<dyn CompletionClient>, pending: PendingSubmission, done_tx: mpsc::Sender<Completed>) {
    tokio::spawn(async move {
        let result = client.complete(pending.prompt()).await;
        // The receiver is gone if the browser disconnected mid-request.
        if done_tx.send((pending, result)).await.is_err() {
            debug!("Connection closed before completion arrived");
        }
    });
}

// One connection, one session. The session lives and dies with this task.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::with_topic(constants::default_topic());
    let (done_tx, mut done_rx) = mpsc::channel::<Completed>(1);

    if send_event(&mut sender, &ServerEvent::snapshot(&session)).await.is_err() {
        warn!("Failed to send initial snapshot to new WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            Some((pending, result)) = done_rx.recv() => {
                if session.finish_submit(pending, result)
                    && send_event(&mut sender, &ServerEvent::snapshot(&session)).await.is_err()
                {
                    warn!("WebSocket client disconnected or send error. Closing connection.");
                    break;
                }
            }

            incoming = receiver.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                };

                let sent = match msg {
                    Message::Text(text) => match parse_client_event(&text) {
                        Ok(event) => {
                            debug!(?event, "Received client event");
                            match apply_client_event(&mut session, event) {
                                Outcome::Render => send_event(&mut sender, &ServerEvent::snapshot(&session)).await,
                                Outcome::Quiet => Ok(()),
                                Outcome::Dispatch(pending) => {
                                    dispatch(state.client.clone(), pending, done_tx.clone());
                                    send_event(&mut sender, &ServerEvent::snapshot(&session)).await
                                }
                                Outcome::Rejected(reason) => {
                                    send_event(&mut sender, &ServerEvent::Rejected { reason }).await
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Ignoring malformed client message: {}", e);
                            send_event(&mut sender, &ServerEvent::Error { message: e.to_string() }).await
                        }
                    },
                    Message::Binary(_) => {
                        warn!("Received unexpected binary message from client");
                        Ok(())
                    }
                    // Axum answers pings itself
                    Message::Ping(_) | Message::Pong(_) => Ok(()),
                    Message::Close(_) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                };

                if let Err(e) = sent {
                    warn!("WebSocket client disconnected or send error: {:?}", e);
                    break;
                }
            }
        }
    }
    info!(turns = session.transcript().len(), "WebSocket connection closed");
}

/// Builds the application router. Directories are resolved relative to the working directory.
pub fn build_router(
    client: Arc<dyn CompletionClient>,
    templates_dir: impl Into<PathBuf>,
    static_dir: impl Into<PathBuf>,
) -> Router {
    let state = AppState {
        templates: Arc::new(create_minijinja_env(templates_dir.into())),
        client,
    };

    let static_files_service = ServeDir::new(static_dir.into()).not_found_service(tower::service_fn(|_: Request| async {
        Ok::<_, std::convert::Infallible>(
            Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("Not Found"))
                .unwrap_or_default(),
        )
    }));

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(host: IpAddr, port: u16, client: Arc<dyn CompletionClient>) -> Result<()> {
    let app = build_router(client, constants::TEMPLATES_DIR.as_str(), constants::STATIC_DIR.as_str());

    let addr = SocketAddr::new(host, port);
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
