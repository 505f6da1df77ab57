pub mod cart;
pub mod error;
pub mod repository;
pub mod reservation;

pub use cart::{Cart, CartItem, CartOwner};
pub use error::{CartSessionError, ReservationError};
pub use reservation::{Reservation, ReservationHolder};
