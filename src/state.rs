use crate::gateway::Gateway;

// app's shared state, handed to every handler through axum `State`
pub struct AppState {
    pub gateway: Gateway,
    // use the first X-Forwarded-For hop as the client id
    pub trust_forwarded_for: bool,
}
