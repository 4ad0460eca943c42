//! IPv4 address allocation inside engine networks.

use std::net::Ipv4Addr;

/// An IPv4 network in CIDR notation, normalised to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    base: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Parse `a.b.c.d/n`. Host bits in the address are cleared.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = cidr.trim().split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        if prefix > 32 {
            return None;
        }
        let base = u32::from(addr) & Self::netmask(prefix);
        Some(Self {
            base: Ipv4Addr::from(base),
            prefix,
        })
    }

    fn netmask(prefix: u8) -> u32 {
        (!0u32).checked_shl(32 - u32::from(prefix)).unwrap_or(0)
    }

    fn host_mask(&self) -> u32 {
        !Self::netmask(self.prefix)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::netmask(self.prefix) == u32::from(self.base)
    }

    /// First address not in `used`, skipping the network address, the
    /// gateway (`.1`) and the broadcast address.
    pub fn next_free(&self, used: &[Ipv4Addr]) -> Option<Ipv4Addr> {
        let base = u32::from(self.base);
        let broadcast = base | self.host_mask();
        (base.checked_add(2)?..broadcast)
            .map(Ipv4Addr::from)
            .find(|candidate| !used.contains(candidate))
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}
