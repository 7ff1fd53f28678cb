pub mod http_client;
pub mod notification_adapter;
