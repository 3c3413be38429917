pub mod chrome;
pub mod surface;
pub mod transport;

mod cdp;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cdp::CdpContext;
pub use surface::{AutomationSurface, SurfaceContext};
