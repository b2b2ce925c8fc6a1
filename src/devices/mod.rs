pub mod emu;
pub mod protocol;
pub mod traits;

pub use emu::EmuDevice;
pub use traits::ReadingSource;
