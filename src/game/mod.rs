pub mod session;

pub use session::{GameSession, RoundOutcome, Side, LEFT_ARROW, RIGHT_ARROW};
