mod common;
mod incremental;
mod language;
mod replay;
