pub mod ledger;
pub mod scheduler;
pub mod session;

pub use ledger::ReservationLedger;
pub use scheduler::CleanupScheduler;
pub use session::CartSessionManager;
