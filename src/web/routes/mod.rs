pub mod activities;
pub mod chat_hub;
pub mod comments;
pub mod profiles;
