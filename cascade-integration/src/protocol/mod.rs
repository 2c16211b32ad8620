/// WebSocket type aliases & connect helper.
pub mod websocket;
