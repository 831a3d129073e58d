mod buffer;
mod clock;
mod palette;
mod series;

pub use buffer::SeriesBuffer;
pub use clock::{Clock, SystemClock};
pub use palette::{Color, PALETTE};
pub use series::{Point, Series};
