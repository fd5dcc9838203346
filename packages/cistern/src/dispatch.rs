// the generic call path: copy arguments into a shard's domain, run the named
// operation against its key tables, copy the results back out.
//
// the dispatcher is the defensive wrapper around the shard-side operations:
// the verbs themselves assume well-formed typed arguments, and everything
// entering from a caller goes through transfer and parsing here first.

use crate::{
    error::CallError,
    pool::{ChannelId, ShardGuard},
    store::Store,
    value::{Key, Value},
};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};

/// Result values of one dispatched operation, in the caller's domain
pub type Results = SmallVec<[Value; 4]>;

/// The named operations a shard can run
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// Drop a channel's entire key table
    Clear,
    /// Append values to a key's queue, respecting its limit
    Send,
    /// Pop one value from the first non-empty queue among the given keys
    Receive,
    /// Pop a bounded batch from one key's queue, all-or-nothing below the minimum
    ReceiveBatched,
    /// Set a key's queue limit
    Limit,
    /// Replace or remove a key's queue outside fifo semantics
    Set,
    /// Peek a key's oldest value
    Get,
    /// Count queued values
    Count,
}

impl Op {
    /// Name used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            Op::Clear => "clear",
            Op::Send => "send",
            Op::Receive => "receive",
            Op::ReceiveBatched => "receive-batched",
            Op::Limit => "limit",
            Op::Set => "set",
            Op::Get => "get",
            Op::Count => "count",
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run `op` against the locked shard on behalf of `caller`
///
/// The generic execution path behind every public operation:
///
/// 1. deep-copy `args` into the shard's domain — on failure nothing has been
///    mutated and the operation does not run;
/// 2. parse the copied arguments for the operation — same guarantee;
/// 3. run the operation against the shard's key tables for `channel`;
/// 4. deep-copy the results back into `caller`'s domain — on failure the
///    storage-side effect stands ("effect happened, outcome unknown");
/// 5. the shard lock releases when the guard drops, on every path.
///
/// An empty result batch means "nothing available" where the operation allows
/// it, never failure. `send` answers `[Bool]`, `receive` `[value, key]` or
/// empty, `receive-batched` the popped values or empty, `get` `[value]` or
/// empty, `count` `[Int]` for one key and `[Map]` otherwise, and
/// `clear`/`limit`/`set` answer nothing.
///
/// Nil sentinel substitution is *not* applied here; the higher layer stages
/// arguments and results through
/// [`toggle_nil_sentinels`](crate::toggle_nil_sentinels) so that stored nils
/// survive the queue's storage representation.
pub fn invoke(
    shard: &mut ShardGuard<'_>,
    op: Op,
    caller: &Store,
    channel: ChannelId,
    args: &[Value],
) -> Result<Results, CallError> {
    let store = shard.store();

    let mut staged = SmallVec::<[Value; 4]>::with_capacity(args.len());
    for arg in args {
        staged.push(store.import(arg).map_err(CallError::ArgumentTransfer)?);
    }

    let results = run(store, op, channel, staged)?;

    let mut delivered = Results::with_capacity(results.len());
    for result in &results {
        delivered.push(caller.import(result).map_err(CallError::ResultTransfer)?);
    }
    Ok(delivered)
}

// run one operation. arguments already live in the shard's domain.
fn run(
    store: &mut Store,
    op: Op,
    channel: ChannelId,
    mut args: SmallVec<[Value; 4]>,
) -> Result<Results, CallError> {
    let mut results = Results::new();
    match op {
        Op::Clear => {
            store.clear(channel);
        }
        Op::Send => {
            const EXPECTED: &str = "a key followed by at least one value";
            if args.len() < 2 {
                return Err(arg_error(op, EXPECTED));
            }
            let key = key_arg(op, &args[0], EXPECTED)?;
            let values: Vec<Value> = args.drain(1..).collect();
            results.push(Value::Bool(store.send(channel, key, values)));
        }
        Op::Receive => {
            const EXPECTED: &str = "at least one key";
            if args.is_empty() {
                return Err(arg_error(op, EXPECTED));
            }
            let keys = args
                .iter()
                .map(|arg| key_arg(op, arg, EXPECTED))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some((value, key)) = store.receive(channel, &keys) {
                results.push(value);
                results.push(key.into());
            }
        }
        Op::ReceiveBatched => {
            const EXPECTED: &str = "a key, a minimum count, and an optional maximum count";
            if args.len() < 2 || args.len() > 3 {
                return Err(arg_error(op, EXPECTED));
            }
            let key = key_arg(op, &args[0], EXPECTED)?;
            let min_count = int_arg(op, &args[1], EXPECTED)?;
            let max_count = match args.get(2) {
                Some(arg) => int_arg(op, arg, EXPECTED)?,
                None => min_count,
            };
            results.extend(store.receive_batched(channel, &key, min_count, max_count));
        }
        Op::Limit => {
            const EXPECTED: &str = "a key and an integer limit";
            if args.len() != 2 {
                return Err(arg_error(op, EXPECTED));
            }
            let key = key_arg(op, &args[0], EXPECTED)?;
            let n = int_arg(op, &args[1], EXPECTED)?;
            // a negative limit means unbounded
            store.limit(channel, key, usize::try_from(n).ok());
        }
        Op::Set => {
            const EXPECTED: &str = "a key and an optional value";
            let value = match args.len() {
                1 => None,
                2 => args.pop(),
                _ => return Err(arg_error(op, EXPECTED)),
            };
            let key = key_arg(op, &args[0], EXPECTED)?;
            store.set(channel, key, value);
        }
        Op::Get => {
            const EXPECTED: &str = "a key";
            if args.len() != 1 {
                return Err(arg_error(op, EXPECTED));
            }
            let key = key_arg(op, &args[0], EXPECTED)?;
            results.extend(store.get(channel, &key));
        }
        Op::Count => {
            const EXPECTED: &str = "zero or more keys";
            let keys = args
                .iter()
                .map(|arg| key_arg(op, arg, EXPECTED))
                .collect::<Result<Vec<_>, _>>()?;
            results.push(store.count(channel, &keys));
        }
    }
    Ok(results)
}

fn arg_error(op: Op, expected: &'static str) -> CallError {
    CallError::Argument { op, expected }
}

fn key_arg(op: Op, value: &Value, expected: &'static str) -> Result<Key, CallError> {
    Key::from_value(value).ok_or(CallError::Argument { op, expected })
}

fn int_arg(op: Op, value: &Value, expected: &'static str) -> Result<i64, CallError> {
    match value {
        Value::Int(n) => Ok(*n),
        _ => Err(CallError::Argument { op, expected }),
    }
}
