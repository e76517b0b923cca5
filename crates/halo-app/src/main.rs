//! # halo-app
//!
//! Application root for the halo exposure notification engine.
//!
//! This binary owns the state container and the engine's execution context:
//! it constructs the [`StateStore`] explicitly (no global singleton),
//! restores persisted causes, and marshals collaborator callbacks onto one
//! single-threaded runtime as messages, so the store is never touched from
//! two contexts at once.
//!
//! The platform collaborators (proximity SDK, push permission query, case
//! sync) are driven here by scripted tasks standing in for the real
//! platform bindings; they exercise the same message path the bindings use.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::info;

use halo_core::{
    AppConfig, Effect, ExposureDay, InactiveReason, InfectionStatus, RequestCoordinator,
    RequestTicket, StateStore, Storage, SyncError, SyncState, TrackingStatus,
};

mod logging;

/// A collaborator result marshaled onto the engine context.
#[derive(Debug)]
enum CauseEvent {
    /// Spontaneous proximity-SDK callback: status and infection together.
    ProximityUpdate {
        tracking: TrackingStatus,
        infection: InfectionStatus,
    },
    /// Push-permission query result, tagged with its request ticket.
    PushPermission {
        ticket: RequestTicket,
        enabled: bool,
    },
    /// Case-sync attempt outcome.
    SyncCompleted(Result<(), SyncError>),
    /// Background-refresh availability changed.
    BackgroundRefresh(bool),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("HALO_ENV").is_ok_and(|env| env == "production");
    logging::init(is_production)?;

    info!("Starting halo-app");

    let config = AppConfig::load().context("loading configuration")?;
    let storage = Storage::default_location()?;

    let mut store = StateStore::new(config.derivation());
    restore_persisted_causes(&mut store, &storage)?;
    let mut dedupe = storage.load_ledger()?;

    let subscription = store.subscribe(|snapshot| {
        info!(
            tracing = ?snapshot.tracing,
            report = ?snapshot.report,
            sync_problem = ?snapshot.sync_problem,
            push_problem = snapshot.push_problem,
            "ui state changed"
        );
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut push_requests = RequestCoordinator::new();

    spawn_proximity_collaborator(tx.clone());
    spawn_sync_collaborator(tx.clone());
    spawn_push_queries(&tx, &mut push_requests);
    drop(tx);

    // The single engine context: every collaborator result is applied here.
    while let Some(event) = rx.recv().await {
        match event {
            CauseEvent::ProximityUpdate {
                tracking,
                infection,
            } => {
                // One SDK callback, one observer notification.
                store.begin_batch();
                store.set_tracking_status(tracking);
                store.set_infection_status(infection.clone());
                store.end_batch();

                if let InfectionStatus::Exposed(days) = &infection {
                    for effect in dedupe.update(days) {
                        execute_effect(&effect);
                    }
                    storage.save_ledger(&dedupe)?;
                }
            }
            CauseEvent::PushPermission { ticket, enabled } => {
                if !push_requests.is_current(ticket) {
                    continue;
                }
                store.set_push_ok(enabled);
            }
            CauseEvent::SyncCompleted(outcome) => {
                match outcome {
                    Ok(()) => store.record_sync_success(),
                    Err(error) => store.record_sync_failure(error),
                }
                storage.save_sync_state(&SyncState {
                    history: store.causes().sync_history,
                    time_inconsistency: store.causes().time_inconsistency,
                })?;
            }
            CauseEvent::BackgroundRefresh(available) => {
                store.set_background_refresh_available(available);
            }
        }
    }

    store.unsubscribe(subscription);
    info!("All collaborators finished, shutting down");
    Ok(())
}

/// Load the persisted cause fields into the store in one batch.
fn restore_persisted_causes(store: &mut StateStore, storage: &Storage) -> anyhow::Result<()> {
    let sync_state = storage.load_sync_state()?;
    let calls = storage.load_call_records()?;
    store.restore_persisted(
        sync_state.history,
        sync_state.time_inconsistency,
        calls.last_phone_call_at,
        calls.called_report_ids,
    );
    Ok(())
}

/// Carry out one engine effect.
fn execute_effect(effect: &Effect) {
    match effect {
        Effect::ScheduleNotification { identifier } => {
            // The notification scheduler is a platform collaborator; the
            // engine's contract ends at emitting the effect once.
            info!(identifier, "scheduling exposure notification");
        }
    }
}

/// Scripted stand-in for the proximity SDK's delegate callbacks.
fn spawn_proximity_collaborator(tx: mpsc::UnboundedSender<CauseEvent>) {
    tokio::spawn(async move {
        let send = |tracking, infection| {
            tx.send(CauseEvent::ProximityUpdate {
                tracking,
                infection,
            })
            .ok()
        };

        send(TrackingStatus::Active, InfectionStatus::Healthy);

        tokio::time::sleep(Duration::from_millis(40)).await;
        send(
            TrackingStatus::Inactive(InactiveReason::BluetoothOff),
            InfectionStatus::Healthy,
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        let days = vec![
            ExposureDay {
                identifier: "report-1".to_string(),
                exposed_date: Utc::now() - chrono::Duration::days(3),
            },
            ExposureDay {
                identifier: "report-2".to_string(),
                exposed_date: Utc::now() - chrono::Duration::days(1),
            },
        ];
        send(
            TrackingStatus::Active,
            InfectionStatus::Exposed(days.clone()),
        );

        // The SDK re-delivers the same set; the dedupe ledger keeps this silent.
        tokio::time::sleep(Duration::from_millis(40)).await;
        send(TrackingStatus::Active, InfectionStatus::Exposed(days));
    });
}

/// Scripted stand-in for the case-sync flow.
fn spawn_sync_collaborator(tx: mpsc::UnboundedSender<CauseEvent>) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(CauseEvent::SyncCompleted(Err(SyncError::Network))).ok();

        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(CauseEvent::SyncCompleted(Err(SyncError::CaseSync))).ok();

        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(CauseEvent::SyncCompleted(Ok(()))).ok();
    });
}

/// Two overlapping push-permission queries; the first is superseded and its
/// late result is discarded by the request coordinator.
fn spawn_push_queries(tx: &mpsc::UnboundedSender<CauseEvent>, requests: &mut RequestCoordinator) {
    let first = requests.issue();
    let tx_first = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx_first
            .send(CauseEvent::PushPermission {
                ticket: first,
                enabled: true,
            })
            .ok();
    });

    let second = requests.issue();
    let tx_second = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        tx_second
            .send(CauseEvent::PushPermission {
                ticket: second,
                enabled: false,
            })
            .ok();
    });
}
