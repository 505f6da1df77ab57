use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::ledger::ReservationLedger;
use crate::session::CartSessionManager;

/// Two independent periodic loops: reservation reconciliation (short
/// interval) and cart expiration sweep (longer interval). A failed cycle is
/// logged and never stops future cycles. Shutdown is cooperative: the stop
/// signal is observed between cycles, so a reconciliation pass either
/// completes or is never entered, and `stop` awaits actual termination.
pub struct CleanupScheduler {
    shutdown: watch::Sender<bool>,
    reservation_task: JoinHandle<()>,
    cart_task: JoinHandle<()>,
}

impl CleanupScheduler {
    pub fn start(
        ledger: Arc<ReservationLedger>,
        sessions: Arc<CartSessionManager>,
        reservation_interval: Duration,
        cart_interval: Duration,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);

        let reservation_task = tokio::spawn(reservation_loop(
            ledger,
            reservation_interval,
            rx.clone(),
        ));
        let cart_task = tokio::spawn(cart_loop(sessions, cart_interval, rx));

        info!(
            reservation_interval_secs = reservation_interval.as_secs(),
            cart_interval_secs = cart_interval.as_secs(),
            "Background cleanup started"
        );

        Self {
            shutdown,
            reservation_task,
            cart_task,
        }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.reservation_task.await;
        let _ = self.cart_task.await;
        info!("Background cleanup stopped");
    }
}

async fn reservation_loop(
    ledger: Arc<ReservationLedger>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(interval) => {
                match ledger.cleanup_expired_reservations().await {
                    Ok(0) => {}
                    Ok(n) => info!(reconciled = n, "Reservation cleanup cycle credited lapsed holds"),
                    Err(e) => error!("Reservation cleanup cycle failed: {}", e),
                }
            }
        }
    }
    info!("Reservation cleanup loop exited");
}

async fn cart_loop(
    sessions: Arc<CartSessionManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(interval) => {
                match sessions.sweep_expired_carts().await {
                    Ok(0) => {}
                    Ok(n) => info!(removed = n, "Cart sweep removed expired carts"),
                    Err(e) => error!("Cart sweep cycle failed: {}", e),
                }
            }
        }
    }
    info!("Cart sweep loop exited");
}
