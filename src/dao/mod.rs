/// Session, player and answer persistence backends.
pub mod game_store;
/// Records written to the store.
pub mod models;
/// Quiz catalog loading.
pub mod quiz_catalog;
/// Backend-agnostic storage errors.
pub mod storage;
