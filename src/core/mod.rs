// Discovery, loading, binding, and error modeling behind the public API.
pub mod bind;
pub mod compiler;
pub mod config;
pub mod error;
pub mod header;
pub mod loader;
pub mod resolve;
