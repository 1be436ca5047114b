/// Database model definitions: room documents, quizzes, conditional-write primitives.
pub mod models;
/// Boundary to the external profile store (cumulative experience).
pub mod profile;
/// Quiz content provider.
pub mod quiz_provider;
/// Room document store abstraction and its backends.
pub mod room_store;
/// Storage abstraction layer errors.
pub mod storage;
