pub mod groq;
pub(crate) mod http_errors;
pub(crate) mod retry;
