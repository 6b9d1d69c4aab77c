// TCM-USER generic netlink ABI (include/uapi/linux/target_core_user.h)

/// Family name registered by the target_core_user module.
pub const CHANNEL_NAME: &str = "TCM-USER";

/// Multicast group carrying device lifecycle events.
pub const GROUP_NAME: &str = "config";

/// First family version that understands `*_DONE` replies and
/// `TCMU_CMD_SET_FEATURES`.
pub const REPLY_CAPABLE_VERSION: u8 = 2;

/// `tcmu_genl_attr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TcmuAttr {
    Unspec = 0,
    Device = 1,
    Minor = 2,
    Pad = 3,
    DevConfig = 4,
    DevSize = 5,
    WriteCache = 6,
    CmdStatus = 7,
    DeviceId = 8,
    SuppKernCmdReply = 9,
}

impl TcmuAttr {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::Unspec),
            1 => Some(Self::Device),
            2 => Some(Self::Minor),
            3 => Some(Self::Pad),
            4 => Some(Self::DevConfig),
            5 => Some(Self::DevSize),
            6 => Some(Self::WriteCache),
            7 => Some(Self::CmdStatus),
            8 => Some(Self::DeviceId),
            9 => Some(Self::SuppKernCmdReply),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// `tcmu_genl_cmd`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TcmuCmd {
    Unspec = 0,
    AddedDevice = 1,
    RemovedDevice = 2,
    ReconfigDevice = 3,
    AddedDeviceDone = 4,
    RemovedDeviceDone = 5,
    ReconfigDeviceDone = 6,
    SetFeatures = 7,
}

impl TcmuCmd {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Unspec),
            1 => Some(Self::AddedDevice),
            2 => Some(Self::RemovedDevice),
            3 => Some(Self::ReconfigDevice),
            4 => Some(Self::AddedDeviceDone),
            5 => Some(Self::RemovedDeviceDone),
            6 => Some(Self::ReconfigDeviceDone),
            7 => Some(Self::SetFeatures),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_kernel_header() {
        assert_eq!(TcmuAttr::DeviceId.code(), 8);
        assert_eq!(TcmuAttr::SuppKernCmdReply.code(), 9);
        assert_eq!(TcmuCmd::SetFeatures.code(), 7);
        for v in 0..=9u16 {
            assert_eq!(TcmuAttr::from_u16(v).map(TcmuAttr::code), Some(v));
        }
        assert_eq!(TcmuAttr::from_u16(10), None);
        assert_eq!(TcmuCmd::from_u8(8), None);
    }
}
