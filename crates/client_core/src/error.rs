use shared::error::{Notice, NoticeCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("store read failed: {0}")]
    StoreRead(String),
    #[error("stored elections could not be decoded: {0}")]
    Decode(String),
    #[error("unlock verification failed: {0}")]
    Unlock(String),
}

impl ListError {
    pub fn notice(&self) -> Notice {
        let code = match self {
            Self::StoreRead(_) | Self::Decode(_) => NoticeCode::StoreReadFailure,
            Self::Unlock(_) => NoticeCode::UnlockFailure,
        };
        Notice::new(code, self.to_string())
    }
}
