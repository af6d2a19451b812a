pub mod activities_service;
pub mod chat_hub_service;
pub mod comments_service;
pub mod followings_service;
pub mod host_gate_service;
pub mod identity_service;
