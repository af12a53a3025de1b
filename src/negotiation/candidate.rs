use std::net::IpAddr;

use serde::{Deserialize, Serialize};

const HOST_TYPE_PREF: u32 = 126;
const TYPE_PREF_SHIFT: u32 = 24;
const LOCAL_PREF_SHIFT: u32 = 8;
const COMPONENT_OFFSET: u32 = 256;

/// Candidate entry as stored in a call's candidate sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateInit {
    /// Host candidate for component 1 on the first media section.
    pub fn host(foundation: &str, ip: IpAddr, port: u16, local_pref: u16, ufrag: &str) -> Self {
        Self {
            candidate: format!(
                "candidate:{foundation} 1 udp {} {ip} {port} typ host",
                priority(HOST_TYPE_PREF, local_pref, 1)
            ),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
            username_fragment: Some(ufrag.to_owned()),
        }
    }

    /// Candidate lines must look like `candidate:<foundation> <component> ...`.
    pub fn is_well_formed(&self) -> bool {
        self.candidate
            .strip_prefix("candidate:")
            .is_some_and(|rest| rest.split_whitespace().count() >= 8)
    }
}

// RFC 8445 §5.1.2.1
const fn priority(type_pref: u32, local_pref: u16, component_id: u8) -> u32 {
    (type_pref << TYPE_PREF_SHIFT)
        | ((local_pref as u32) << LOCAL_PREF_SHIFT)
        | (COMPONENT_OFFSET - component_id as u32)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn host_line_and_priority() {
        let c = IceCandidateInit::host("1", "127.0.0.1".parse().unwrap(), 50000, 65535, "abcd");
        assert_eq!(
            c.candidate,
            format!("candidate:1 1 udp {} 127.0.0.1 50000 typ host", 2_130_706_431u32)
        );
        assert!(c.is_well_formed());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let c = IceCandidateInit::host("1", "127.0.0.1".parse().unwrap(), 1, 1, "u");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["sdpMid"], json!("0"));
        assert_eq!(v["sdpMLineIndex"], json!(0));
        assert_eq!(v["usernameFragment"], json!("u"));
    }

    #[test]
    fn rejects_garbage() {
        let c = IceCandidateInit {
            candidate: "hello".into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        };
        assert!(!c.is_well_formed());
    }
}
