//! Data model and real-time plumbing shared by every rtio backend.
//!
//! Nothing here talks to an audio system. Native backends implement
//! [`Backend`] and call [`Dispatch::process`] once per period.

pub mod backend;
pub mod buffer;
pub mod callback;
pub mod device;
pub mod error;
pub mod params;
pub mod sample;
pub mod state;
pub mod sync;
pub mod time;

pub use self::backend::{Backend, Dispatch, Flow};
pub use self::buffer::{AudioBuffer, BufferGroup, BufferView, BufferViewMut};
pub use self::callback::{default_error_callback, silence, write_silence, Callback, ErrorCallback};
pub use self::device::{DeviceIndex, DeviceInfo};
pub use self::error::{ParamsError, StreamError, StreamResult, StreamStatus};
pub use self::params::StreamParams;
pub use self::sample::{Sample, SampleFormat, I24};
pub use self::state::Lifecycle;
pub use self::sync::slot::{CallbackSlot, ExchangeError, SlotGuard};
pub use self::time::RealTime;
