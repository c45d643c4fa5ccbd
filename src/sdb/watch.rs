//! Watchpoints.
//!
//! A watchpoint is an expression which is re-evaluated after every executed instruction.
//! When its value changes, execution stops.
//!
//! Watchpoints are held in a [`WatchPool`], which has a fixed number of slots ([`NR_WP`]).
//! Each watchpoint is identified by the index of its slot.
//! Freed slots are reused in last-freed, first-used order.
//!
//! ```
//! use sdb::sdb::watch::WatchPool;
//! use sdb::sim::Simulator;
//!
//! let mut sim = Simulator::new(Default::default());
//! let mut pool = WatchPool::new();
//!
//! let id = pool.add("$a0", &sim).unwrap();
//! assert!(pool.poll(&sim).unwrap().is_empty());
//!
//! sim.reg_file.set(10, 5);
//! let events = pool.poll(&sim).unwrap();
//! assert_eq!(events[0].id, id);
//! assert_eq!((events[0].old, events[0].new), (0, 5));
//! ```
use std::collections::VecDeque;

use crate::expr::{evaluate, EvalContext, EvalErr};
use crate::Word;

/// The number of watchpoint slots.
pub const NR_WP: usize = 32;

/// A live watchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    id: u8,
    expr: String,
    value: Word,
}
impl Watchpoint {
    /// The ID of this watchpoint.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The expression being watched.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// The value of the expression when it was last evaluated.
    pub fn value(&self) -> Word {
        self.value
    }
}

/// A change in a watchpoint's value, detected by [`WatchPool::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The ID of the watchpoint.
    pub id: u8,
    /// The watched expression.
    pub expr: String,
    /// The previous value.
    pub old: Word,
    /// The new value.
    pub new: Word,
}

/// Errors from adding or removing watchpoints.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum WpErr {
    /// All slots are in use.
    PoolExhausted,
    /// The expression could not be evaluated.
    InvalidExpression(EvalErr),
    /// No live watchpoint has this ID.
    NotFound(u8),
}
impl std::fmt::Display for WpErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WpErr::PoolExhausted        => write!(f, "no free watchpoints (the limit is {NR_WP})"),
            WpErr::InvalidExpression(e) => write!(f, "invalid expression: {e}"),
            WpErr::NotFound(id)         => write!(f, "no watchpoint number {id}"),
        }
    }
}
impl std::error::Error for WpErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WpErr::InvalidExpression(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for WpErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        match self {
            WpErr::InvalidExpression(e) => crate::err::Error::span(e),
            _ => None
        }
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            WpErr::PoolExhausted        => Some("delete a watchpoint with `d N`".into()),
            WpErr::InvalidExpression(e) => crate::err::Error::help(e),
            WpErr::NotFound(_)          => Some("`info w` lists the active watchpoints".into()),
        }
    }
}

/// A watchpoint could not be re-evaluated.
///
/// This is fatal: the monitor ends the session when it occurs.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PollErr {
    /// The ID of the watchpoint.
    pub id: u8,
    /// The watched expression.
    pub expr: String,
    /// The evaluation error.
    pub err: EvalErr,
}
impl std::fmt::Display for PollErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watchpoint {} ({}) could not be evaluated: {}", self.id, self.expr, self.err)
    }
}
impl std::error::Error for PollErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}
impl crate::err::Error for PollErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        crate::err::Error::help(&self.err)
    }
}

/// A fixed-capacity pool of watchpoints.
#[derive(Debug, Clone)]
pub struct WatchPool {
    slots: Vec<Option<Watchpoint>>,
    /// Free slot IDs. The top of the stack is the next to be used.
    free: Vec<u8>,
    /// Live IDs, most recently added first.
    live: VecDeque<u8>,
}
impl WatchPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slots: vec![None; NR_WP],
            free: (0..NR_WP as u8).rev().collect(),
            live: VecDeque::with_capacity(NR_WP),
        }
    }

    /// Adds a watchpoint on an expression, returning its ID.
    ///
    /// The expression is evaluated immediately to get its initial value.
    ///
    /// # Errors
    /// This fails if all slots are in use or if the expression cannot be evaluated.
    /// In either case, the pool is unchanged.
    pub fn add(&mut self, expr: &str, ctx: &dyn EvalContext) -> Result<u8, WpErr> {
        let &id = self.free.last().ok_or(WpErr::PoolExhausted)?;
        let value = evaluate(expr, ctx).map_err(WpErr::InvalidExpression)?;

        self.free.pop();
        self.live.push_front(id);
        self.slots[usize::from(id)] = Some(Watchpoint { id, expr: expr.to_string(), value });

        tracing::debug!("added watchpoint {id} on {expr:?} (value {value})");
        Ok(id)
    }

    /// Removes the watchpoint with the given ID.
    ///
    /// # Errors
    /// This fails if no live watchpoint has this ID.
    pub fn remove(&mut self, id: u8) -> Result<(), WpErr> {
        let slot = self.slots.get_mut(usize::from(id))
            .filter(|s| s.is_some())
            .ok_or(WpErr::NotFound(id))?;

        *slot = None;
        self.live.retain(|&i| i != id);
        self.free.push(id);

        tracing::debug!("removed watchpoint {id}");
        Ok(())
    }

    /// Re-evaluates every watchpoint, returning the ones whose values changed.
    ///
    /// Changes are reported in listing order (see [`WatchPool::iter`]),
    /// and the stored values are updated.
    /// Polling twice without changing the machine state reports nothing the second time.
    ///
    /// # Errors
    /// This fails if a watched expression can no longer be evaluated.
    pub fn poll(&mut self, ctx: &dyn EvalContext) -> Result<Vec<WatchEvent>, PollErr> {
        let mut events = vec![];

        for &id in &self.live {
            let Some(wp) = self.slots[usize::from(id)].as_mut() else { continue };

            let new = evaluate(&wp.expr, ctx)
                .map_err(|err| PollErr { id, expr: wp.expr.clone(), err })?;

            if new != wp.value {
                events.push(WatchEvent { id, expr: wp.expr.clone(), old: wp.value, new });
                wp.value = new;
            }
        }

        Ok(events)
    }

    /// Gets the live watchpoint with the given ID.
    pub fn get(&self, id: u8) -> Option<&Watchpoint> {
        self.slots.get(usize::from(id))?.as_ref()
    }

    /// Iterates over the live watchpoints, most recently added first.
    pub fn iter(&self) -> impl Iterator<Item=&Watchpoint> + '_ {
        self.live.iter()
            .filter_map(|&id| self.slots[usize::from(id)].as_ref())
    }

    /// The number of live watchpoints.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether there are no live watchpoints.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
impl Default for WatchPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::expr::{EvalContext, EvalErr};
    use crate::Word;

    use super::{WatchEvent, WatchPool, WpErr, NR_WP};

    #[derive(Default)]
    struct Machine {
        a0: Cell<Word>,
    }
    impl EvalContext for Machine {
        fn reg_value(&self, name: &str) -> Option<Word> {
            match name {
                "a0" => Some(self.a0.get()),
                "zero" => Some(0),
                _ => None
            }
        }

        fn vaddr_read(&self, addr: Word, _len: usize) -> Option<Word> {
            (addr == 0x8000_0000).then_some(0x1234)
        }
    }

    fn ids(pool: &WatchPool) -> Vec<u8> {
        pool.iter().map(|wp| wp.id()).collect()
    }

    #[test]
    fn test_add_remove() {
        let m = Machine::default();
        let mut pool = WatchPool::new();
        assert!(pool.is_empty());

        let id = pool.add("$a0 + 1", &m).unwrap();
        assert_eq!(id, 0);
        assert_eq!(pool.len(), 1);
        let wp = pool.get(id).unwrap();
        assert_eq!(wp.expr(), "$a0 + 1");
        assert_eq!(wp.value(), 1);

        pool.remove(id).unwrap();
        assert!(pool.is_empty());
        assert!(pool.get(id).is_none());
        assert_eq!(pool.remove(id), Err(WpErr::NotFound(id)));
        assert_eq!(pool.remove(200), Err(WpErr::NotFound(200)));

        // the freed slot is used again
        assert_eq!(pool.add("*0x80000000", &m), Ok(0));
        assert_eq!(pool.get(0).unwrap().value(), 0x1234);
    }

    #[test]
    fn test_invalid_expression() {
        let m = Machine::default();
        let mut pool = WatchPool::new();

        assert_eq!(pool.add("1 +", &m), Err(WpErr::InvalidExpression(EvalErr::EmptyRange)));
        assert_eq!(pool.add("$sp", &m), Err(WpErr::InvalidExpression(EvalErr::UnknownRegister("sp".into()))));
        assert!(pool.is_empty());
        assert_eq!(pool.add("$a0", &m), Ok(0));
    }

    #[test]
    fn test_exhaustion() {
        let m = Machine::default();
        let mut pool = WatchPool::new();

        for i in 0..NR_WP {
            assert_eq!(pool.add("$a0", &m), Ok(i as u8));
        }
        assert_eq!(pool.add("$a0", &m), Err(WpErr::PoolExhausted));
        // exhaustion is reported before the expression is checked
        assert_eq!(pool.add("1 +", &m), Err(WpErr::PoolExhausted));
        assert_eq!(pool.len(), NR_WP);

        pool.remove(17).unwrap();
        assert_eq!(pool.add("$a0", &m), Ok(17));
    }

    #[test]
    fn test_lifo_reuse() {
        let m = Machine::default();
        let mut pool = WatchPool::new();

        for _ in 0..4 {
            pool.add("$a0", &m).unwrap();
        }
        pool.remove(1).unwrap();
        pool.remove(3).unwrap();
        pool.remove(0).unwrap();

        assert_eq!(pool.add("$a0", &m), Ok(0));
        assert_eq!(pool.add("$a0", &m), Ok(3));
        assert_eq!(pool.add("$a0", &m), Ok(1));
        assert_eq!(pool.add("$a0", &m), Ok(4));
    }

    #[test]
    fn test_ordering() {
        let m = Machine::default();
        let mut pool = WatchPool::new();

        for _ in 0..4 {
            pool.add("$a0", &m).unwrap();
        }
        assert_eq!(ids(&pool), [3, 2, 1, 0]);

        pool.remove(2).unwrap();
        assert_eq!(ids(&pool), [3, 1, 0]);

        pool.add("$a0", &m).unwrap();
        assert_eq!(ids(&pool), [2, 3, 1, 0]);
    }

    #[test]
    fn test_poll() {
        let m = Machine::default();
        let mut pool = WatchPool::new();

        pool.add("$a0", &m).unwrap();
        pool.add("$a0 == 3", &m).unwrap();
        pool.add("*0x80000000", &m).unwrap();
        assert_eq!(pool.poll(&m), Ok(vec![]));

        m.a0.set(3);
        assert_eq!(pool.poll(&m), Ok(vec![
            WatchEvent { id: 1, expr: "$a0 == 3".into(), old: 0, new: 1 },
            WatchEvent { id: 0, expr: "$a0".into(), old: 0, new: 3 },
        ]));
        assert_eq!(pool.get(0).unwrap().value(), 3);

        // idempotent
        assert_eq!(pool.poll(&m), Ok(vec![]));
    }

    #[test]
    fn test_poll_err() {
        let m = Machine::default();
        let mut pool = WatchPool::new();

        pool.add("*($a0 + 0x80000000)", &m).unwrap();
        m.a0.set(4);

        let err = pool.poll(&m).unwrap_err();
        assert_eq!(err.id, 0);
        assert_eq!(err.expr, "*($a0 + 0x80000000)");
        assert_eq!(err.err, EvalErr::BadAddress(0x8000_0004));
    }
}
