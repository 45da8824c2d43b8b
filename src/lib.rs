pub mod batch;
pub mod calc;
pub mod pool;
pub mod protocol;

pub use calc::{Operator, Outcome, ResultKind, Solution, evaluate};
pub use pool::ThreadPool;
pub use protocol::{CalcServer, ConnectionHeader, Framing, RequestEnvelope};
