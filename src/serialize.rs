//! Persistence (spec.md §6 "Persistence (serialization)").
//!
//! Writes the binary stream spec.md specifies: `u64 N; N * (tagA, tagB);
//! u64 k; k * u64`. A topological walk (bottom-up, shared-node-aware,
//! the same shape as the teacher's `Walkable::walk_up`) assigns every
//! reachable node a dense stream id `1..N` before any record is written,
//! so a node is always written after both its children.
//!
//! The teacher's `io::put`/`io::get` dump a `Vec<T>` as raw bytes via
//! `slice_to_u8s`/`u8s_to_slice` -- fine for a homogeneous in-memory
//! layout, but unsound for a tagged node stream meant to outlive one
//! process: the in-memory `Nid`/tuple layout carries platform-dependent
//! padding a raw transmute would leak into the file. This writes each
//! field individually instead, in a format any [`Kind`] implementor can
//! share -- bdd and zdd nodes are both `(Vid, Nid, Nid)`, so one pair of
//! functions round-trips either.
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};

use crate::kind::Kind;
use crate::nid::Nid;
use crate::vid::Vid;

const INV_BIT: u64 = 1 << 63;
const ID_MASK: u64 = (1 << 40) - 1;
const VAR_BITS: u32 = 22;
const VAR_SHIFT: u32 = 40;
const VAR_MASK: u64 = (1 << VAR_BITS) - 1;

fn encode(id_of: &HashMap<Nid, u64>, n: Nid) -> u64 {
    let inv = if n.is_inv() { INV_BIT } else { 0 };
    if n.is_const() { inv } else { inv | id_of[&n.raw()] }
}

fn decode(word: u64, built: &[Nid]) -> Nid {
    use crate::nid::{I, O};
    let id = word & ID_MASK;
    let inv = word & INV_BIT != 0;
    let base = if id == 0 { if inv { I } else { O } } else { built[(id - 1) as usize] };
    base.inv_if(inv && id != 0)
}

fn topo_order<K: Kind>(k: &K, roots: &[Nid]) -> Vec<Nid> {
    fn go<K: Kind>(k: &K, n: Nid, seen: &mut HashSet<Nid>, order: &mut Vec<Nid>) {
        if n.is_const() { return; }
        let raw = n.raw();
        if !seen.insert(raw) { return; }
        let v = k.var_of(raw);
        let (hi, lo) = k.cofactors(raw, v);
        go(k, hi, seen, order);
        go(k, lo, seen, order);
        order.push(raw);
    }
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for &r in roots { go(k, r, &mut seen, &mut order); }
    order
}

/// Write every node reachable from `roots` plus the roots themselves.
pub fn write_stream<K: Kind, W: Write>(k: &K, roots: &[Nid], w: &mut W) -> io::Result<()> {
    let order = topo_order(k, roots);
    let mut id_of = HashMap::with_capacity(order.len());
    for (i, &n) in order.iter().enumerate() { id_of.insert(n, (i + 1) as u64); }

    w.write_all(&(order.len() as u64).to_le_bytes())?;
    for &n in &order {
        let v = k.var_of(n);
        let (hi, lo) = k.cofactors(n, v);
        let tag_a = encode(&id_of, hi);
        let tag_b = encode(&id_of, lo) | ((v.label() as u64 & VAR_MASK) << VAR_SHIFT);
        w.write_all(&tag_a.to_le_bytes())?;
        w.write_all(&tag_b.to_le_bytes())?;
    }

    w.write_all(&(roots.len() as u64).to_le_bytes())?;
    for &r in roots { w.write_all(&encode(&id_of, r).to_le_bytes())?; }
    Ok(())
}

/// Read a stream written by [`write_stream`] back into `k`'s unique
/// table, returning the roots in the order they were written.
pub fn read_stream<K: Kind, R: Read>(k: &K, r: &mut R) -> io::Result<Vec<Nid>> {
    let n = read_u64(r)?;
    let mut built: Vec<Nid> = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let tag_a = read_u64(r)?;
        let tag_b = read_u64(r)?;
        let hi = decode(tag_a, &built);
        let lo = decode(tag_b, &built);
        let var = Vid::new(((tag_b >> VAR_SHIFT) & VAR_MASK) as u32);
        built.push(k.restrict(var, hi, lo));
    }
    let k_roots = read_u64(r)?;
    let mut roots = Vec::with_capacity(k_roots as usize);
    for _ in 0..k_roots { roots.push(decode(read_u64(r)?, &built)); }
    Ok(roots)
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::BddBase;
    use crate::zdd::ZddBase;

    #[test]
    fn test_bdd_round_trip() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let z = b.new_var();
        let f = b.or(b.and(x, y), z);

        let mut buf = Vec::new();
        write_stream(&b, &[f], &mut buf).unwrap();
        let roots = read_stream(&b, &mut buf.as_slice()).unwrap();

        assert_eq!(roots.len(), 1);
        assert_eq!(b.satcount(roots[0], 3), b.satcount(f, 3));
    }

    #[test]
    fn test_zdd_round_trip_multi_root() {
        let z = ZddBase::new(1);
        let x = z.new_var();
        let y = z.new_var();
        let a = z.union(x, y);
        let b = z.inter(x, x);

        let mut buf = Vec::new();
        write_stream(&z, &[a, b], &mut buf).unwrap();
        let roots = read_stream(&z, &mut buf.as_slice()).unwrap();

        assert_eq!(z.count(roots[0]), z.count(a));
        assert_eq!(z.count(roots[1]), z.count(b));
    }

    #[test]
    fn test_empty_stream() {
        let b = BddBase::new(1);
        let mut buf = Vec::new();
        write_stream(&b, &[], &mut buf).unwrap();
        let roots = read_stream(&b, &mut buf.as_slice()).unwrap();
        assert!(roots.is_empty());
    }
}
