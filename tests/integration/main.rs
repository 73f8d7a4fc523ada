mod eavesdropper;
mod http_api;
mod session_lifecycle;
mod support;
mod sync;
