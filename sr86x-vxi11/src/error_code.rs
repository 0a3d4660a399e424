//! VXI-11 device error codes

/// Text for a VXI-11 device error code
///
/// Code 0 (no error) maps to an empty string; codes the table does not know
/// map to `"Unknown"`.
pub fn device_error_message(code: i32) -> &'static str {
    match code {
        0 => "",
        1 => "Syntax error",
        3 => "Device not accessible",
        4 => "Invalid link identifier",
        5 => "Parameter error",
        6 => "Channel not established",
        8 => "Operation not supported",
        9 => "Out of resources",
        11 => "Device locked by another link",
        12 => "No lock held by this link",
        15 => "I/O timeout",
        17 => "I/O error",
        21 => "Invalid address",
        23 => "Abort",
        29 => "Channel already established",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(device_error_message(0), "");
        assert_eq!(device_error_message(4), "Invalid link identifier");
        assert_eq!(device_error_message(11), "Device locked by another link");
        assert_eq!(device_error_message(15), "I/O timeout");
        assert_eq!(device_error_message(29), "Channel already established");
    }

    #[test]
    fn test_unknown_codes() {
        for code in [2, 7, 10, 13, 30, -1] {
            assert_eq!(device_error_message(code), "Unknown");
        }
    }
}
