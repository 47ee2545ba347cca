use core::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use cheap_clone::CheapClone;

/// An address family a resolved record can belong to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Family {
  /// IPv4, `A` records.
  V4,
  /// IPv6, `AAAA` records.
  V6,
}

impl Family {
  /// The raw `AF_INET` tag used by the host's socket layer.
  #[cfg(unix)]
  pub const INET_TAG: u16 = libc::AF_INET as u16;
  /// The raw `AF_INET6` tag used by the host's socket layer.
  #[cfg(unix)]
  pub const INET6_TAG: u16 = libc::AF_INET6 as u16;

  /// The raw `AF_INET` tag used by the host's socket layer.
  #[cfg(not(unix))]
  pub const INET_TAG: u16 = 2;
  /// The raw `AF_INET6` tag used by the host's socket layer.
  #[cfg(not(unix))]
  pub const INET6_TAG: u16 = 23;

  /// Parses a raw socket-address family tag.
  ///
  /// Returns `None` for any tag other than [`Family::INET_TAG`] and [`Family::INET6_TAG`].
  #[inline]
  pub const fn from_tag(tag: u16) -> Option<Self> {
    match tag {
      Self::INET_TAG => Some(Self::V4),
      Self::INET6_TAG => Some(Self::V6),
      _ => None,
    }
  }

  /// Returns the raw socket-address family tag.
  #[inline]
  pub const fn tag(&self) -> u16 {
    match self {
      Self::V4 => Self::INET_TAG,
      Self::V6 => Self::INET6_TAG,
    }
  }

  /// Returns the other family.
  #[inline]
  pub const fn other(&self) -> Self {
    match self {
      Self::V4 => Self::V6,
      Self::V6 => Self::V4,
    }
  }

  /// Returns the length in bytes of an address of this family.
  #[inline]
  pub const fn address_len(&self) -> usize {
    match self {
      Self::V4 => 4,
      Self::V6 => 16,
    }
  }
}

impl fmt::Display for Family {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::V4 => write!(f, "ipv4"),
      Self::V6 => write!(f, "ipv6"),
    }
  }
}

/// One resolved IP endpoint.
///
/// Equality only looks at the variant and the address bytes, so a `V4` is
/// never equal to a `V6`, even when both describe the same host. Compare
/// [`Ip::to_canonical_v6`] results if that is what you need.
///
/// ```
/// use name_resolver::Ip;
/// use std::net::Ipv6Addr;
///
/// assert_eq!(Ip::V4_LOOPBACK.as_ipv6(), Ipv6Addr::LOCALHOST);
/// assert_ne!(Ip::V4([0, 0, 0, 1]), Ip::V6([0; 16]));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ip {
  /// An IPv4 address in network byte order.
  V4([u8; 4]),
  /// An IPv6 address in network byte order.
  V6([u8; 16]),
}

const MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

impl Ip {
  /// `127.0.0.1`
  pub const V4_LOOPBACK: Self = Self::V4([127, 0, 0, 1]);

  /// `::1`
  pub const V6_LOOPBACK: Self = Self::V6([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

  /// Builds an address of the given family from raw network-order bytes.
  ///
  /// Returns `None` if the length of `bytes` does not match the family.
  pub fn from_bytes(family: Family, bytes: &[u8]) -> Option<Self> {
    match family {
      Family::V4 => <[u8; 4]>::try_from(bytes).ok().map(Self::V4),
      Family::V6 => <[u8; 16]>::try_from(bytes).ok().map(Self::V6),
    }
  }

  /// Returns the family of the address.
  #[inline]
  pub const fn family(&self) -> Family {
    match self {
      Self::V4(_) => Family::V4,
      Self::V6(_) => Family::V6,
    }
  }

  /// Returns the raw address bytes, 4 for `V4` and 16 for `V6`.
  #[inline]
  pub fn octets(&self) -> &[u8] {
    match self {
      Self::V4(b) => b.as_slice(),
      Self::V6(b) => b.as_slice(),
    }
  }

  /// Returns the 16 byte canonical form of the address.
  ///
  /// `V6` maps byte for byte. `V4` maps to `::ffff:a.b.c.d`, except for
  /// `127.0.0.1` which maps to `::1`.
  pub fn to_canonical_v6(&self) -> [u8; 16] {
    match self {
      Self::V6(b) => *b,
      Self::V4([127, 0, 0, 1]) => Ipv6Addr::LOCALHOST.octets(),
      Self::V4(b) => {
        let mut out = [0u8; 16];
        out[..12].copy_from_slice(&MAPPED_PREFIX);
        out[12..].copy_from_slice(b);
        out
      }
    }
  }

  /// Returns the IPv4 bytes of the address.
  ///
  /// A `V6` only converts when it is IPv4-mapped (`::ffff:a.b.c.d`).
  pub fn to_v4(&self) -> Option<[u8; 4]> {
    match self {
      Self::V4(b) => Some(*b),
      Self::V6(b) if b[..12] == MAPPED_PREFIX => Some([b[12], b[13], b[14], b[15]]),
      Self::V6(_) => None,
    }
  }

  /// The canonical form as an [`Ipv6Addr`].
  #[inline]
  pub fn as_ipv6(&self) -> Ipv6Addr {
    Ipv6Addr::from(self.to_canonical_v6())
  }

  /// The IPv4 form as an [`Ipv4Addr`], see [`Ip::to_v4`].
  #[inline]
  pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
    self.to_v4().map(Ipv4Addr::from)
  }

  /// Returns a [`SocketAddr`] for the address with the given port.
  #[inline]
  pub fn to_socket_addr(&self, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::from(*self), port)
  }
}

impl CheapClone for Ip {
  #[inline]
  fn cheap_clone(&self) -> Self {
    *self
  }
}

impl fmt::Display for Ip {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::V4(b) => write!(f, "v4({})", Ipv4Addr::from(*b)),
      Self::V6(b) => write!(f, "v6({})", Ipv6Addr::from(*b)),
    }
  }
}

impl From<Ipv4Addr> for Ip {
  #[inline]
  fn from(value: Ipv4Addr) -> Self {
    Self::V4(value.octets())
  }
}

impl From<Ipv6Addr> for Ip {
  #[inline]
  fn from(value: Ipv6Addr) -> Self {
    Self::V6(value.octets())
  }
}

impl From<IpAddr> for Ip {
  #[inline]
  fn from(value: IpAddr) -> Self {
    match value {
      IpAddr::V4(v4) => v4.into(),
      IpAddr::V6(v6) => v6.into(),
    }
  }
}

impl From<SocketAddrV4> for Ip {
  #[inline]
  fn from(value: SocketAddrV4) -> Self {
    (*value.ip()).into()
  }
}

impl From<SocketAddrV6> for Ip {
  #[inline]
  fn from(value: SocketAddrV6) -> Self {
    (*value.ip()).into()
  }
}

impl From<SocketAddr> for Ip {
  #[inline]
  fn from(value: SocketAddr) -> Self {
    value.ip().into()
  }
}

impl From<[u8; 4]> for Ip {
  #[inline]
  fn from(value: [u8; 4]) -> Self {
    Self::V4(value)
  }
}

impl From<[u8; 16]> for Ip {
  #[inline]
  fn from(value: [u8; 16]) -> Self {
    Self::V6(value)
  }
}

impl From<Ip> for IpAddr {
  #[inline]
  fn from(value: Ip) -> Self {
    match value {
      Ip::V4(b) => IpAddr::V4(Ipv4Addr::from(b)),
      Ip::V6(b) => IpAddr::V6(Ipv6Addr::from(b)),
    }
  }
}

#[cfg(feature = "arbitrary")]
const _: () = {
  use arbitrary::{Arbitrary, Result, Unstructured};

  impl<'a> Arbitrary<'a> for Ip {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
      if u.arbitrary::<bool>()? {
        Ok(Self::V4(u.arbitrary()?))
      } else {
        Ok(Self::V6(u.arbitrary()?))
      }
    }
  }
};

#[cfg(any(feature = "quickcheck", test))]
const _: () = {
  use quickcheck::{Arbitrary, Gen};

  impl Arbitrary for Ip {
    fn arbitrary(g: &mut Gen) -> Self {
      if bool::arbitrary(g) {
        let mut b = [0u8; 4];
        b.iter_mut().for_each(|o| *o = u8::arbitrary(g));
        Self::V4(b)
      } else {
        let mut b = [0u8; 16];
        b.iter_mut().for_each(|o| *o = u8::arbitrary(g));
        Self::V6(b)
      }
    }
  }
};
