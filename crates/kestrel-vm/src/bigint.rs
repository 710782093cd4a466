//! Handle table of arbitrary-precision integers owned by the host.
//!
//! Contracts never see the values directly, only the handles returned by
//! [`BigIntContext::new_value`]. Handles are sequential from
//! [`BIGINT_HANDLE_BASE`], never reused within a call, and a nested call
//! starts a fresh generation of the table.

use crate::error::VmError;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};
use std::cmp::Ordering;

/// First handle handed out in every call.
pub const BIGINT_HANDLE_BASE: i32 = 0;

#[derive(Debug, Clone, Default)]
pub struct BigIntContext {
    values: Vec<BigInt>,
    stack: Vec<Vec<BigInt>>,
}

impl BigIntContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle holding `small_value`.
    pub fn new_value(&mut self, small_value: i64) -> i32 {
        self.insert(BigInt::from(small_value))
    }

    /// Allocate a handle holding `value`.
    pub fn insert(&mut self, value: BigInt) -> i32 {
        self.values.push(value);
        BIGINT_HANDLE_BASE + (self.values.len() as i32 - 1)
    }

    fn index(&self, handle: i32) -> Result<usize, VmError> {
        let index = handle
            .checked_sub(BIGINT_HANDLE_BASE)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or(VmError::InvalidHandle(handle))?;
        if index < self.values.len() {
            Ok(index)
        } else {
            Err(VmError::InvalidHandle(handle))
        }
    }

    pub fn get(&self, handle: i32) -> Result<&BigInt, VmError> {
        let index = self.index(handle)?;
        Ok(&self.values[index])
    }

    pub fn set(&mut self, handle: i32, value: BigInt) -> Result<(), VmError> {
        let index = self.index(handle)?;
        self.values[index] = value;
        Ok(())
    }

    /// Unsigned big-endian bytes of the magnitude. Zero has no bytes.
    pub fn get_bytes(&self, handle: i32) -> Result<Vec<u8>, VmError> {
        Ok(magnitude_bytes(self.get(handle)?))
    }

    /// Overwrite `handle` with the non-negative value of `bytes` (big-endian).
    pub fn set_bytes(&mut self, handle: i32, bytes: &[u8]) -> Result<(), VmError> {
        self.set(handle, BigInt::from_bytes_be(Sign::Plus, bytes))
    }

    pub fn byte_length(&self, handle: i32) -> Result<usize, VmError> {
        let value = self.get(handle)?;
        Ok(if value.is_zero() { 0 } else { value.bits().div_ceil(8) as usize })
    }

    pub fn is_int64(&self, handle: i32) -> Result<bool, VmError> {
        Ok(self.get(handle)?.to_i64().is_some())
    }

    /// The value as i64; values outside the range yield their low 64 bits.
    pub fn get_int64(&self, handle: i32) -> Result<i64, VmError> {
        let value = self.get(handle)?;
        Ok(value.to_i64().unwrap_or_else(|| {
            let low = value.magnitude().iter_u64_digits().next().unwrap_or(0) as i64;
            if value.sign() == Sign::Minus {
                low.wrapping_neg()
            } else {
                low
            }
        }))
    }

    pub fn set_int64(&mut self, handle: i32, value: i64) -> Result<(), VmError> {
        self.set(handle, BigInt::from(value))
    }

    pub fn add(&mut self, dest: i32, op1: i32, op2: i32) -> Result<(), VmError> {
        let result = self.get(op1)? + self.get(op2)?;
        self.set(dest, result)
    }

    pub fn sub(&mut self, dest: i32, op1: i32, op2: i32) -> Result<(), VmError> {
        let result = self.get(op1)? - self.get(op2)?;
        self.set(dest, result)
    }

    pub fn mul(&mut self, dest: i32, op1: i32, op2: i32) -> Result<(), VmError> {
        let result = self.get(op1)? * self.get(op2)?;
        self.set(dest, result)
    }

    /// -1, 0 or 1.
    pub fn cmp(&self, op1: i32, op2: i32) -> Result<i32, VmError> {
        Ok(match self.get(op1)?.cmp(self.get(op2)?) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Start a new generation for a nested call.
    pub fn push_state(&mut self) {
        self.stack.push(std::mem::take(&mut self.values));
    }

    /// Drop the current generation and restore the parent's table.
    pub fn pop_state(&mut self) -> Result<(), VmError> {
        self.values = self.stack.pop().ok_or(VmError::StateStackUnderflow)?;
        Ok(())
    }

    pub fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    pub fn init_state(&mut self) {
        self.values.clear();
        self.stack.clear();
    }
}

/// Unsigned big-endian magnitude; empty for zero.
pub fn magnitude_bytes(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        Vec::new()
    } else {
        value.magnitude().to_bytes_be()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn big(s: &str) -> BigInt {
        s.parse().unwrap()
    }

    #[test]
    fn test_handles_are_sequential() {
        let mut ctx = BigIntContext::new();
        assert_eq!(ctx.new_value(5), BIGINT_HANDLE_BASE);
        assert_eq!(ctx.new_value(6), BIGINT_HANDLE_BASE + 1);
        assert_eq!(ctx.get(BIGINT_HANDLE_BASE + 1).unwrap(), &BigInt::from(6));
    }

    #[test]
    fn test_invalid_handle() {
        let mut ctx = BigIntContext::new();
        ctx.new_value(1);
        assert_eq!(ctx.get(1), Err(VmError::InvalidHandle(1)));
        assert_eq!(ctx.get(-1), Err(VmError::InvalidHandle(-1)));
        assert_eq!(ctx.add(0, 0, 9), Err(VmError::InvalidHandle(9)));
    }

    #[test]
    fn test_bytes_encoding() {
        let mut ctx = BigIntContext::new();
        let h = ctx.new_value(0);
        assert_eq!(ctx.get_bytes(h).unwrap(), Vec::<u8>::new());
        assert_eq!(ctx.byte_length(h).unwrap(), 0);

        ctx.set_bytes(h, &[19, 233]).unwrap();
        assert_eq!(ctx.get_int64(h).unwrap(), 19 * 256 + 233);
        assert_eq!(ctx.get_bytes(h).unwrap(), vec![19, 233]);
        assert_eq!(ctx.byte_length(h).unwrap(), 2);

        ctx.set_int64(h, -64).unwrap();
        assert_eq!(ctx.get_bytes(h).unwrap(), vec![64]);
    }

    #[test]
    fn test_int64_boundaries() {
        let mut ctx = BigIntContext::new();
        let max = ctx.insert(BigInt::from(i64::MAX));
        let min = ctx.insert(BigInt::from(i64::MIN));
        let over = ctx.insert(BigInt::from(i64::MAX) + 1);
        let under = ctx.insert(BigInt::from(i64::MIN) - 1);

        assert!(ctx.is_int64(max).unwrap());
        assert!(ctx.is_int64(min).unwrap());
        assert!(!ctx.is_int64(over).unwrap());
        assert!(!ctx.is_int64(under).unwrap());
        assert_eq!(ctx.get_int64(over).unwrap(), i64::MIN);
    }

    #[test]
    fn test_dest_may_alias_operand() {
        let mut ctx = BigIntContext::new();
        let a = ctx.insert(big("123456789012345678901234567890"));
        let b = ctx.new_value(10);
        ctx.mul(a, a, b).unwrap();
        assert_eq!(ctx.get(a).unwrap(), &big("1234567890123456789012345678900"));
        ctx.add(b, b, b).unwrap();
        assert_eq!(ctx.get(b).unwrap(), &BigInt::from(20));
    }

    #[test]
    fn test_generations() {
        let mut ctx = BigIntContext::new();
        let parent = ctx.new_value(42);

        ctx.push_state();
        assert!(ctx.get(parent).is_err());
        let child = ctx.new_value(7);
        assert_eq!(child, BIGINT_HANDLE_BASE);

        ctx.pop_state().unwrap();
        assert_eq!(ctx.get(parent).unwrap(), &BigInt::from(42));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.pop_state(), Err(VmError::StateStackUnderflow));
    }

    fn any_bigint() -> impl Strategy<Value = BigInt> {
        (any::<bool>(), proptest::collection::vec(any::<u8>(), 0..40)).prop_map(|(negative, bytes)| {
            let sign = if negative { Sign::Minus } else { Sign::Plus };
            BigInt::from_bytes_be(sign, &bytes)
        })
    }

    proptest! {
        #[test]
        fn prop_get_returns_inserted(v in any_bigint()) {
            let mut ctx = BigIntContext::new();
            let h = ctx.insert(v.clone());
            prop_assert_eq!(ctx.get(h).unwrap(), &v);
        }

        #[test]
        fn prop_new_value_roundtrip(v in any::<i64>()) {
            let mut ctx = BigIntContext::new();
            let h = ctx.new_value(v);
            prop_assert!(ctx.is_int64(h).unwrap());
            prop_assert_eq!(ctx.get_int64(h).unwrap(), v);
        }

        #[test]
        fn prop_set_bytes_of_get_bytes_is_idempotent(bytes in proptest::collection::vec(any::<u8>(), 0..40)) {
            let mut ctx = BigIntContext::new();
            let h = ctx.new_value(0);
            ctx.set_bytes(h, &bytes).unwrap();
            let encoded = ctx.get_bytes(h).unwrap();
            let before = ctx.get(h).unwrap().clone();
            ctx.set_bytes(h, &encoded).unwrap();
            prop_assert_eq!(ctx.get(h).unwrap(), &before);
            prop_assert_eq!(ctx.byte_length(h).unwrap(), encoded.len());
        }

        #[test]
        fn prop_arithmetic_identities(a in any_bigint(), b in any_bigint(), c in any_bigint()) {
            let mut ctx = BigIntContext::new();
            let ha = ctx.insert(a.clone());
            let hb = ctx.insert(b.clone());
            let hc = ctx.insert(c.clone());
            let t1 = ctx.new_value(0);
            let t2 = ctx.new_value(0);

            // (a + b) + c == a + (b + c)
            ctx.add(t1, ha, hb).unwrap();
            ctx.add(t1, t1, hc).unwrap();
            ctx.add(t2, hb, hc).unwrap();
            ctx.add(t2, ha, t2).unwrap();
            prop_assert_eq!(ctx.cmp(t1, t2).unwrap(), 0);

            // (a + b) - b == a
            ctx.add(t1, ha, hb).unwrap();
            ctx.sub(t1, t1, hb).unwrap();
            prop_assert_eq!(ctx.get(t1).unwrap(), &a);

            // a * (b + c) == a*b + a*c
            ctx.add(t1, hb, hc).unwrap();
            ctx.mul(t1, ha, t1).unwrap();
            ctx.mul(t2, ha, hb).unwrap();
            let t3 = ctx.new_value(0);
            ctx.mul(t3, ha, hc).unwrap();
            ctx.add(t2, t2, t3).unwrap();
            prop_assert_eq!(ctx.get(t1).unwrap(), ctx.get(t2).unwrap());
        }

        #[test]
        fn prop_cmp_is_consistent(a in any_bigint(), b in any_bigint()) {
            let mut ctx = BigIntContext::new();
            let ha = ctx.insert(a.clone());
            let hb = ctx.insert(b.clone());
            prop_assert_eq!(ctx.cmp(ha, ha).unwrap(), 0);
            let expected = match a.cmp(&b) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            prop_assert_eq!(ctx.cmp(ha, hb).unwrap(), expected);
            prop_assert_eq!(ctx.cmp(hb, ha).unwrap(), -expected);
        }
    }
}
