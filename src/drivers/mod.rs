pub mod sim;
pub mod tlv;
pub mod transport;
