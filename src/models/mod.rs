pub mod participant;
pub mod room;
pub mod room_option;
pub mod session;
