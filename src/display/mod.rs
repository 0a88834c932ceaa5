//! Panel side: severity styling, line reconciliation, the driver seam, bitmap
//! upload and the device session that ties them together.

pub mod driver;
pub mod images;
pub mod session;
pub mod severity;
pub mod sync;
