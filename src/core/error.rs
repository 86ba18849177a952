use std::io;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("can't create a thread for downloading: {0}")]
    Spawn(#[source] io::Error),
}
