#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WASM parsing error: {0}")]
    WasmParse(#[from] wasmparser::BinaryReaderError),

    #[error("function index {0} has no type")]
    FunctionTypeNotFound(u32),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
