pub mod api_types;
pub mod routes;
pub mod state;
pub mod wiring;
