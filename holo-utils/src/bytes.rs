//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};

thread_local!(
    pub static TLS_BUF: RefCell<BytesMut> =
        RefCell::new(BytesMut::with_capacity(4096))
);

// Extension methods for Bytes.
//
// All getters are fallible: reading past the end of the buffer returns a
// `TryGetError` and leaves the buffer untouched. Multi-octet values are read
// in network byte order.
pub trait BytesExt {
    /// Gets a 3-octet unsigned integer, as used by MPLS labels.
    fn try_get_u24(&mut self) -> Result<u32, TryGetError>;

    /// Gets a 4-octet IPv4 address.
    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError>;

    /// Gets a 16-octet IPv6 address.
    fn try_get_ipv6(&mut self) -> Result<Ipv6Addr, TryGetError>;

    /// Splits off the next `len` bytes.
    fn try_split_to(&mut self, len: usize) -> Result<Bytes, TryGetError>;
}

// Extension methods for BytesMut.
//
// Multi-octet values are written in network byte order.
pub trait BytesMutExt {
    /// Writes the three low-order octets of `n`.
    fn put_u24(&mut self, n: u32);

    /// Writes an IPv4 or IPv6 address, without any length or family tag.
    fn put_ip(&mut self, addr: &IpAddr);

    fn put_ipv4(&mut self, addr: &Ipv4Addr);

    fn put_ipv6(&mut self, addr: &Ipv6Addr);

    /// Writes the field produced by `f`, preceded by its 1-octet length.
    fn put_len8_prefixed<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self);

    /// Writes the field produced by `f`, preceded by its 2-octet length.
    fn put_len16_prefixed<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self);
}

// ===== impl Bytes =====

impl BytesExt for Bytes {
    fn try_get_u24(&mut self) -> Result<u32, TryGetError> {
        let n = self.try_get_uint(3)?;
        Ok(n as u32)
    }

    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError> {
        Ok(Ipv4Addr::from(self.try_get_u32()?))
    }

    fn try_get_ipv6(&mut self) -> Result<Ipv6Addr, TryGetError> {
        Ok(Ipv6Addr::from(self.try_get_u128()?))
    }

    fn try_split_to(&mut self, len: usize) -> Result<Bytes, TryGetError> {
        if len > self.remaining() {
            return Err(TryGetError {
                requested: len,
                available: self.remaining(),
            });
        }
        Ok(self.split_to(len))
    }
}

// ===== impl BytesMut =====

impl BytesMutExt for BytesMut {
    fn put_u24(&mut self, n: u32) {
        self.put_uint(n.into(), 3);
    }

    fn put_ip(&mut self, addr: &IpAddr) {
        match addr {
            IpAddr::V4(addr) => self.put_ipv4(addr),
            IpAddr::V6(addr) => self.put_ipv6(addr),
        }
    }

    fn put_ipv4(&mut self, addr: &Ipv4Addr) {
        self.put_u32((*addr).into())
    }

    fn put_ipv6(&mut self, addr: &Ipv6Addr) {
        self.put_u128((*addr).into())
    }

    fn put_len8_prefixed<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let len_pos = self.len();
        self.put_u8(0);
        f(self);
        self[len_pos] = (self.len() - len_pos - 1) as u8;
    }

    fn put_len16_prefixed<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let len_pos = self.len();
        self.put_u16(0);
        f(self);
        let len = (self.len() - len_pos - 2) as u16;
        self[len_pos..len_pos + 2].copy_from_slice(&len.to_be_bytes());
    }
}

// ===== unit tests =====
