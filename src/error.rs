#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("window_len must be a power of two, got {0}")]
    InvalidWindowLen(u32),

    #[error("transport send failed: {0}")]
    Transport(#[from] std::io::Error),

    #[error("packet descriptor exceeds {max} A-REQ entries (n_areq={actual})")]
    TooManyAreq { max: usize, actual: usize },
}
