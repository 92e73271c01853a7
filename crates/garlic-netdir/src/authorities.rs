//! The embedded directory-authority list:
//! enough of the real network's directory authorities, compiled in, to
//! bootstrap a consensus fetch with no other configuration.
//!
//! This mirrors the authority list arti and little-t-tor both embed at
//! build time; it only needs to stay roughly in sync with the real
//! network, since a stale or partially-wrong entry just gets skipped by
//! [`crate::dirclient`]'s retry-across-authorities loop.

use std::net::Ipv4Addr;

/// One directory authority: enough to open a directory connection and
/// nothing else (this client never votes or mirrors).
#[derive(Debug, Clone, Copy)]
pub struct DirAuthority {
    /// Human-readable name, for logging only.
    pub nickname: &'static str,
    /// IPv4 address of the authority's OR/dir port.
    pub ipv4: Ipv4Addr,
    /// The authority's directory port.
    pub dir_port: u16,
}

impl DirAuthority {
    /// This authority's directory `SocketAddr`.
    pub fn dir_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.ipv4.into(), self.dir_port)
    }
}

/// The compiled-in authority list, taken from the real Tor network's
/// `dirauth` set at the time of writing.
pub const AUTHORITIES: &[DirAuthority] = &[
    DirAuthority { nickname: "moria1", ipv4: Ipv4Addr::new(128, 31, 0, 39), dir_port: 9131 },
    DirAuthority { nickname: "tor26", ipv4: Ipv4Addr::new(217, 196, 147, 77), dir_port: 80 },
    DirAuthority { nickname: "dizum", ipv4: Ipv4Addr::new(45, 66, 35, 11), dir_port: 80 },
    DirAuthority { nickname: "gabelmoo", ipv4: Ipv4Addr::new(131, 188, 40, 189), dir_port: 80 },
    DirAuthority { nickname: "dannenberg", ipv4: Ipv4Addr::new(193, 23, 244, 244), dir_port: 80 },
    DirAuthority { nickname: "maatuska", ipv4: Ipv4Addr::new(171, 25, 193, 9), dir_port: 443 },
    DirAuthority { nickname: "longclaw", ipv4: Ipv4Addr::new(199, 58, 81, 140), dir_port: 80 },
    DirAuthority { nickname: "bastet", ipv4: Ipv4Addr::new(204, 13, 164, 118), dir_port: 80 },
    DirAuthority { nickname: "faravahar", ipv4: Ipv4Addr::new(216, 218, 219, 41), dir_port: 80 },
];

/// Pick a random authority from the embedded list.
pub fn random_authority<R: rand::Rng + ?Sized>(rng: &mut R) -> &'static DirAuthority {
    use rand::seq::SliceRandom;
    AUTHORITIES.choose(rng).expect("AUTHORITIES is never empty")
}

/// An iterator yielding every authority in a random order, used to walk
/// through candidates across retries without repeating one until all
/// have been tried.
pub fn shuffled_authorities<R: rand::Rng + ?Sized>(rng: &mut R) -> Vec<&'static DirAuthority> {
    use rand::seq::SliceRandom;
    let mut v: Vec<&'static DirAuthority> = AUTHORITIES.iter().collect();
    v.shuffle(rng);
    v
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn authority_list_is_nonempty_and_has_valid_ports() {
        assert!(!AUTHORITIES.is_empty());
        for a in AUTHORITIES {
            assert_ne!(a.dir_port, 0);
        }
    }

    #[test]
    fn shuffled_authorities_contains_every_entry_exactly_once() {
        let mut rng = rand::thread_rng();
        let shuffled = shuffled_authorities(&mut rng);
        assert_eq!(shuffled.len(), AUTHORITIES.len());
        for a in AUTHORITIES {
            assert_eq!(shuffled.iter().filter(|x| x.nickname == a.nickname).count(), 1);
        }
    }
}
