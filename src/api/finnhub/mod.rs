pub mod messages;
pub mod quote;
pub mod ws;
