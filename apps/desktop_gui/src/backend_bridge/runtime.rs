//! Runtime bridge between UI command queue and backend event intake.

use std::{
    sync::{Arc, Weak},
    thread,
    time::Duration,
};

use client_core::{ClientEvent, ClientSettings, MessengerClient};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorCategory, UiErrorContext, UiEvent};

pub fn launch(settings: ClientSettings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                report_startup_failure(&ui_tx, format!("failed to build runtime: {err}"));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let client = match MessengerClient::from_settings(&settings) {
                Ok(client) => client,
                Err(err) => {
                    report_startup_failure(&ui_tx, err.to_string());
                    tracing::error!("failed to create messenger client: {err}");
                    return;
                }
            };
            tracing::info!(api_base = %settings.api_base, "backend worker ready");

            tokio::spawn(forward_client_events(
                Arc::downgrade(&client),
                client.subscribe_events(),
                ui_tx.clone(),
            ));

            // Blocking recv keeps this thread parked between commands while
            // the runtime workers drive the pollers.
            while let Ok(cmd) = cmd_rx.recv() {
                tracing::debug!(command = cmd.name(), "handling ui command");
                handle_command(&client, &ui_tx, cmd);
            }
            tracing::info!("ui command queue closed; backend worker exiting");
        });
    });
}

const RESYNC_RETRY: Duration = Duration::from_millis(250);

/// Relays client events to the UI queue. Once anything is dropped, the
/// next delivery is a full replay of client state instead, retried until
/// the UI drains its queue.
async fn forward_client_events(
    client: Weak<MessengerClient>,
    mut events: broadcast::Receiver<ClientEvent>,
    ui_tx: Sender<UiEvent>,
) {
    let mut stale = false;
    loop {
        let received = tokio::select! {
            received = events.recv() => Some(received),
            _ = tokio::time::sleep(RESYNC_RETRY), if stale => None,
        };
        match received {
            Some(Err(RecvError::Closed)) => break,
            Some(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "ui event forwarder lagged");
                stale = true;
            }
            Some(Ok(event)) if !stale => {
                stale = !push_events(&ui_tx, vec![event]);
                if stale {
                    tracing::warn!("ui event queue full; will replay state once it drains");
                }
            }
            Some(Ok(_)) | None => {
                let Some(client) = client.upgrade() else {
                    break;
                };
                stale = !push_events(&ui_tx, client.replay_events());
                if !stale {
                    tracing::info!("ui event queue drained; state replayed");
                }
            }
        }
    }
}

/// Returns false as soon as one event cannot be queued.
fn push_events(ui_tx: &Sender<UiEvent>, events: Vec<ClientEvent>) -> bool {
    for event in events {
        match ui_tx.try_send(UiEvent::from(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => return false,
        }
    }
    true
}

fn report_startup_failure(ui_tx: &Sender<UiEvent>, reason: String) {
    let _ = ui_tx.try_send(UiEvent::Error(UiError::new(
        UiErrorContext::BackendStartup,
        UiErrorCategory::Unknown,
        format!("backend worker startup failure: {reason}"),
    )));
}

fn handle_command(client: &Arc<MessengerClient>, ui_tx: &Sender<UiEvent>, cmd: BackendCommand) {
    match cmd {
        BackendCommand::CheckHealth => {
            let (client, ui_tx) = (client.clone(), ui_tx.clone());
            tokio::spawn(async move {
                let result = client
                    .health()
                    .await
                    .map(|health| health.status)
                    .map_err(|err| err.to_string());
                let _ = ui_tx.try_send(UiEvent::BackendHealth(result));
            });
        }
        BackendCommand::RestoreSession => {
            let client = client.clone();
            tokio::spawn(async move {
                if let Err(err) = client.restore_session().await {
                    tracing::warn!("session restore failed: {err}");
                }
            });
        }
        BackendCommand::Authenticate {
            mode,
            username,
            password,
        } => {
            let (client, ui_tx) = (client.clone(), ui_tx.clone());
            tokio::spawn(async move {
                if let Err(err) = client.authenticate(mode, &username, &password).await {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client_error(
                        UiErrorContext::Auth,
                        &err,
                    )));
                }
                let _ = ui_tx.try_send(UiEvent::AuthFinished);
            });
        }
        BackendCommand::Logout => client.logout(),
        BackendCommand::StartChat { username } => {
            let (client, ui_tx) = (client.clone(), ui_tx.clone());
            tokio::spawn(async move {
                match client.start_chat(&username).await {
                    Ok(Some(conversation)) => {
                        let _ = ui_tx.try_send(UiEvent::ChatStarted(conversation));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client_error(
                            UiErrorContext::StartChat,
                            &err,
                        )));
                    }
                }
            });
        }
        BackendCommand::SelectConversation { conversation_id } => {
            client.select_conversation(conversation_id);
        }
        BackendCommand::SendMessage { text } => {
            // Staging is synchronous so the optimistic entry precedes any
            // later command's effects.
            let Some(outgoing) = client.stage_message(&text) else {
                return;
            };
            let (client, ui_tx) = (client.clone(), ui_tx.clone());
            tokio::spawn(async move {
                if let Err(err) = client.deliver(outgoing).await {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_client_error(
                        UiErrorContext::SendMessage,
                        &err,
                    )));
                }
            });
        }
    }
}
