use std::sync::Arc;

use velora_cart::{CartSessionManager, ReservationLedger};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ReservationLedger>,
    pub sessions: Arc<CartSessionManager>,
}
