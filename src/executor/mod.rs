mod models;
mod transport;

pub use models::HttpResponse;
pub use transport::{HttpTransport, ReqwestTransport};
