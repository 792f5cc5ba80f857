mod cookies;
mod default_headers;
mod redirect;
mod retry;

pub use cookies::Cookies;
pub use default_headers::DefaultHeaders;
pub use redirect::FollowRedirect;
pub use retry::RetryConnection;
