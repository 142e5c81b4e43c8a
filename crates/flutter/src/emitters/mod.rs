//! Concrete emitters.
//!
//! | Emitter          | Destination                           |
//! |------------------|---------------------------------------|
//! | [`DebugEmitter`] | JSON lines on any writer (stdout)     |
//! | [`TickerEmitter`]| one progress line per tick on stderr  |
//! | [`OtlpEmitter`]  | OTLP/HTTP JSON collector              |

mod debug;
mod otlp;
mod ticker;

pub use debug::DebugEmitter;
pub use otlp::{OtlpEmitter, is_accepted};
pub use ticker::TickerEmitter;
