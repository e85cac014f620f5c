//! Device identity derived from the ESP32 factory MAC address.
//!
//! The broker client identifier defaults to the full 6-byte MAC in
//! lowercase hex (`deadbeefcafe`).  It is deterministic across reboots
//! (factory-burned eFuse MAC) and unique per board, which the broker
//! requires: two sessions with one client id kick each other off.

use core::fmt::Write;

/// Lowercase hex of 6 bytes: 12 chars.
pub type ClientIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the 6 bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Hex-encode the MAC for use as the broker client id.
pub fn client_id(mac: &MacAddress) -> ClientIdString {
    let mut id = ClientIdString::new();
    for byte in mac {
        // Cannot fail: 12 chars fit in 16.
        let _ = write!(id, "{:02x}", byte);
    }
    id
}
