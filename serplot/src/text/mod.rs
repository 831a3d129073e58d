mod line_ending;
mod parser;
mod record;

pub use line_ending::LineEnding;
pub use parser::{ParseOutput, StreamParser};
pub use record::{decode_record, parse_number, DecodedRecord};
