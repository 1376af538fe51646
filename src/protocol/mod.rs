//! Wire protocol: advertising payloads, status records and UART framing.

pub mod advertising;
pub mod bitfield;
pub mod crc;
pub mod meatnet;
pub mod status;
pub mod uart;

pub use advertising::{AdvertisingData, HopCount, ProductType, VENDOR_ID};
pub use meatnet::{NodeMessage, NodeMessageType, NodeRequest, NodeResponse};
pub use status::ProbeStatus;
pub use uart::{MessageType, Request, Response};
