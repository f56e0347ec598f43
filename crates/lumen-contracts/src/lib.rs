pub mod chat;
pub mod events;
pub mod memory;
pub mod modes;
