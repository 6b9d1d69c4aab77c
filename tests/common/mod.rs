// Scripted in-memory kernel shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tcmu_netlink::Core::attr::{self, Attribute};
use tcmu_netlink::Core::conn::{
    Family, MulticastGroup, CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_ATTR_MCAST_GROUPS,
    CTRL_ATTR_MCAST_GRP_ID, CTRL_ATTR_MCAST_GRP_NAME, CTRL_ATTR_VERSION, CTRL_CMD_GETFAMILY,
    CTRL_CMD_NEWFAMILY, GENL_ID_CTRL,
};
use tcmu_netlink::Core::message::{
    parse_messages, GenlMessage, NetlinkHeader, NLMSG_ERROR, NLMSG_HDRLEN,
};
use tcmu_netlink::Core::NetlinkTransport;
use tcmu_netlink::TCMU::{TcmuAttr, TcmuCmd};

pub const FAMILY_ID: u16 = 0x1b;
pub const CONFIG_GROUP_ID: u32 = 5;
pub const LOCAL_PORT: u32 = 4242;

#[derive(Default)]
struct State {
    inbound: VecDeque<io::Result<Vec<u8>>>,
    sent: Vec<Vec<u8>>,
    joined: Vec<u32>,
    failing_commands: Vec<u8>,
    fail_join: bool,
    interrupted: bool,
}

/// Pretends to be the kernel side of a generic netlink socket.
///
/// Controller lookups are answered from `family`; everything else that is
/// sent is recorded. `recv` blocks until a datagram is queued or
/// `interrupt` is called.
pub struct FakeKernel {
    family: Option<Family>,
    state: Mutex<State>,
    ready: Condvar,
}

impl std::fmt::Debug for FakeKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeKernel").finish_non_exhaustive()
    }
}

pub fn tcmu_family(version: u8) -> Family {
    Family {
        id: FAMILY_ID,
        version,
        name: "TCM-USER".into(),
        groups: vec![
            MulticastGroup {
                id: 3,
                name: "other".into(),
            },
            MulticastGroup {
                id: CONFIG_GROUP_ID,
                name: "config".into(),
            },
        ],
    }
}

impl FakeKernel {
    pub fn new(version: u8) -> Arc<Self> {
        Self::with_family(Some(tcmu_family(version)))
    }

    /// `None` makes every family lookup fail with ENOENT.
    pub fn with_family(family: Option<Family>) -> Arc<Self> {
        Arc::new(Self {
            family,
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
        })
    }

    pub fn fail_command(&self, command: TcmuCmd) {
        self.state.lock().failing_commands.push(command.code());
    }

    pub fn fail_join(&self) {
        self.state.lock().fail_join = true;
    }

    pub fn push_datagram(&self, datagram: Vec<u8>) {
        self.state.lock().inbound.push_back(Ok(datagram));
        self.ready.notify_all();
    }

    pub fn push_error(&self, err: io::Error) {
        self.state.lock().inbound.push_back(Err(err));
        self.ready.notify_all();
    }

    pub fn push_event(&self, command: u8, attrs: &[Attribute]) {
        self.push_datagram(event_datagram(FAMILY_ID, command, attrs));
    }

    pub fn joined(&self) -> Vec<u32> {
        self.state.lock().joined.clone()
    }

    /// Everything sent to the TCMU family, in order.
    pub fn sent(&self) -> Vec<GenlMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .flat_map(|d| parse_messages(d).expect("sent datagram parses"))
            .filter(|m| m.header.kind == FAMILY_ID)
            .map(|m| GenlMessage::from_netlink(m).expect("genl header"))
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().inbound.len()
    }

    fn answer_controller(&self, state: &mut State, request: &GenlMessage) {
        let sequence = request.netlink.sequence;
        let reply = match &self.family {
            Some(family) => {
                let data = attr::encode(&family_attributes(family)).expect("encode family");
                GenlMessage::new(CTRL_CMD_NEWFAMILY, 2, data).to_bytes(
                    GENL_ID_CTRL,
                    0,
                    sequence,
                    LOCAL_PORT,
                )
            }
            None => error_datagram(-libc::ENOENT, sequence),
        };
        state.inbound.push_back(Ok(reply));
    }
}

impl NetlinkTransport for FakeKernel {
    fn send(&self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        for msg in parse_messages(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))? {
            let genl = GenlMessage::from_netlink(msg)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            if genl.netlink.kind == GENL_ID_CTRL && genl.header.command == CTRL_CMD_GETFAMILY {
                self.answer_controller(&mut state, &genl);
                self.ready.notify_all();
                continue;
            }
            if state.failing_commands.contains(&genl.header.command) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure"));
            }
        }
        state.sent.push(buf.to_vec());
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted"));
            }
            if let Some(next) = state.inbound.pop_front() {
                let datagram = next?;
                buf[..datagram.len()].copy_from_slice(&datagram);
                return Ok(datagram.len());
            }
            self.ready.wait(&mut state);
        }
    }

    fn join_group(&self, group: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_join {
            return Err(io::Error::from_raw_os_error(libc::EPERM));
        }
        state.joined.push(group);
        Ok(())
    }

    fn local_port(&self) -> u32 {
        LOCAL_PORT
    }

    fn interrupt(&self) -> io::Result<()> {
        self.state.lock().interrupted = true;
        self.ready.notify_all();
        Ok(())
    }
}

pub fn family_attributes(family: &Family) -> Vec<Attribute> {
    let groups: Vec<Attribute> = family
        .groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let inner = attr::encode(&[
                Attribute::string(CTRL_ATTR_MCAST_GRP_NAME, &g.name),
                Attribute::u32(CTRL_ATTR_MCAST_GRP_ID, g.id),
            ])
            .expect("encode group");
            Attribute::new(i as u16 + 1, inner)
        })
        .collect();

    vec![
        Attribute::u16(CTRL_ATTR_FAMILY_ID, family.id),
        Attribute::string(CTRL_ATTR_FAMILY_NAME, &family.name),
        Attribute::u32(CTRL_ATTR_VERSION, u32::from(family.version)),
        Attribute::new(
            CTRL_ATTR_MCAST_GROUPS,
            attr::encode(&groups).expect("encode groups"),
        ),
    ]
}

pub fn error_datagram(errno: i32, sequence: u32) -> Vec<u8> {
    let mut out = Vec::new();
    NetlinkHeader {
        length: (NLMSG_HDRLEN + 4 + NLMSG_HDRLEN) as u32,
        kind: NLMSG_ERROR,
        flags: 0,
        sequence,
        pid: LOCAL_PORT,
    }
    .write_to(&mut out);
    out.extend_from_slice(&errno.to_ne_bytes());
    // Echo of the offending header; its content is irrelevant here.
    out.extend_from_slice(&[0u8; NLMSG_HDRLEN]);
    out
}

/// A bare control message (`NLMSG_NOOP`, `NLMSG_DONE`, `NLMSG_OVERRUN`).
pub fn control_datagram(kind: u16) -> Vec<u8> {
    let mut out = Vec::new();
    NetlinkHeader {
        length: NLMSG_HDRLEN as u32,
        kind,
        flags: 0,
        sequence: 0,
        pid: 0,
    }
    .write_to(&mut out);
    out
}

/// A kernel multicast notification: sequence 0, port 0.
pub fn event_datagram(family: u16, command: u8, attrs: &[Attribute]) -> Vec<u8> {
    let data = attr::encode(attrs).expect("encode event");
    GenlMessage::new(command, 2, data).to_bytes(family, 0, 0, 0)
}

pub fn device_id_attr(id: u32) -> Attribute {
    Attribute::u32(TcmuAttr::DeviceId.code(), id)
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
