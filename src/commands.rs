//! The typed command surface.
//!
//! Each command is declared once and expanded three ways: a constructor on
//! [`Cmd`], an async method on [`Session`] and a blocking method on
//! [`Connection`]. Every method returns the server's reply verbatim as a
//! [`Value`]; interpretation is the caller's.

use crate::aio::Session;
use crate::cmd::{cmd, Cmd};
use crate::connection::Connection;
use crate::types::{RedisResult, ToRedisArgs, Value};

macro_rules! implement_commands {
    (
        $(
            $(#[$attr:meta])+
            fn $name:ident<$($tyargs:ident : $ty:ident),*>(
                $($argname:ident: $argty:ty),*) $body:block
        )*
    ) => {
        impl Cmd {
            $(
                $(#[$attr])*
                pub fn $name<$($tyargs: $ty),*>($($argname: $argty),*) -> Cmd {
                    ::std::mem::replace($body, Cmd::new())
                }
            )*
        }

        impl Session {
            $(
                $(#[$attr])*
                pub async fn $name<$($tyargs: $ty),*>(
                    &self $(, $argname: $argty)*
                ) -> RedisResult<Value> {
                    self.execute(&Cmd::$name($($argname),*)).await
                }
            )*
        }

        impl Connection {
            $(
                $(#[$attr])*
                pub fn $name<$($tyargs: $ty),*>(
                    &mut self $(, $argname: $argty)*
                ) -> RedisResult<Value> {
                    self.execute(&Cmd::$name($($argname),*))
                }
            )*
        }
    }
}

implement_commands! {
    // -- connection

    /// Authenticate with the default user.
    fn auth<P: ToRedisArgs>(password: P) {
        cmd("AUTH").arg(password)
    }

    /// Authenticate as a named user.
    fn auth_with_username<U: ToRedisArgs, P: ToRedisArgs>(username: U, password: P) {
        cmd("AUTH").arg(username).arg(password)
    }

    /// Switch to the given logical database.
    fn select<D: ToRedisArgs>(db: D) {
        cmd("SELECT").arg(db)
    }

    /// Ping the server.
    fn ping<>() {
        &mut cmd("PING")
    }

    /// Echo the given message back from the server.
    fn echo<M: ToRedisArgs>(message: M) {
        cmd("ECHO").arg(message)
    }

    /// Switch the connection protocol version.
    fn hello<V: ToRedisArgs>(version: V) {
        cmd("HELLO").arg(version)
    }

    // -- strings

    /// Get the value of a key.
    fn get<K: ToRedisArgs>(key: K) {
        cmd("GET").arg(key)
    }

    /// Set the value of a key.
    fn set<K: ToRedisArgs, V: ToRedisArgs>(key: K, value: V) {
        cmd("SET").arg(key).arg(value)
    }

    /// Set the value of a key with an expiry in seconds.
    fn setex<K: ToRedisArgs, V: ToRedisArgs>(key: K, seconds: i64, value: V) {
        cmd("SETEX").arg(key).arg(seconds).arg(value)
    }

    /// Set the value of a key with an expiry in milliseconds.
    fn psetex<K: ToRedisArgs, V: ToRedisArgs>(key: K, milliseconds: i64, value: V) {
        cmd("PSETEX").arg(key).arg(milliseconds).arg(value)
    }

    /// Delete one or more keys; the reply counts how many existed.
    fn del<K: ToRedisArgs>(key: K) {
        cmd("DEL").arg(key)
    }

    /// Check how many of the given keys exist.
    fn exists<K: ToRedisArgs>(key: K) {
        cmd("EXISTS").arg(key)
    }

    /// Increment a numeric key by one.
    fn incr<K: ToRedisArgs>(key: K) {
        cmd("INCR").arg(key)
    }

    /// Increment a numeric key by the given amount.
    fn incr_by<K: ToRedisArgs>(key: K, delta: i64) {
        cmd("INCRBY").arg(key).arg(delta)
    }

    /// Decrement a numeric key by one.
    fn decr<K: ToRedisArgs>(key: K) {
        cmd("DECR").arg(key)
    }

    /// Decrement a numeric key by the given amount.
    fn decr_by<K: ToRedisArgs>(key: K, delta: i64) {
        cmd("DECRBY").arg(key).arg(delta)
    }

    /// Set multiple keys at once from `(key, value)` pairs.
    fn mset<KV: ToRedisArgs>(items: KV) {
        cmd("MSET").arg(items)
    }

    /// Get the values of all given keys.
    fn mget<K: ToRedisArgs>(keys: K) {
        cmd("MGET").arg(keys)
    }

    /// Seconds to live of a key.
    fn ttl<K: ToRedisArgs>(key: K) {
        cmd("TTL").arg(key)
    }

    /// Set a timeout on a key, in seconds.
    fn expire<K: ToRedisArgs>(key: K, seconds: i64) {
        cmd("EXPIRE").arg(key).arg(seconds)
    }

    /// List keys matching a glob pattern.
    fn keys<P: ToRedisArgs>(pattern: P) {
        cmd("KEYS").arg(pattern)
    }

    // -- hashes

    /// Get a single hash field.
    fn hget<K: ToRedisArgs, F: ToRedisArgs>(key: K, field: F) {
        cmd("HGET").arg(key).arg(field)
    }

    /// Set a single hash field.
    fn hset<K: ToRedisArgs, F: ToRedisArgs, V: ToRedisArgs>(key: K, field: F, value: V) {
        cmd("HSET").arg(key).arg(field).arg(value)
    }

    /// Delete one or more hash fields.
    fn hdel<K: ToRedisArgs, F: ToRedisArgs>(key: K, field: F) {
        cmd("HDEL").arg(key).arg(field)
    }

    /// Get all fields and values of a hash.
    fn hgetall<K: ToRedisArgs>(key: K) {
        cmd("HGETALL").arg(key)
    }

    /// Get the values of several hash fields.
    fn hmget<K: ToRedisArgs, F: ToRedisArgs>(key: K, fields: F) {
        cmd("HMGET").arg(key).arg(fields)
    }

    /// Set several hash fields from `(field, value)` pairs.
    fn hmset<K: ToRedisArgs, FV: ToRedisArgs>(key: K, items: FV) {
        cmd("HMSET").arg(key).arg(items)
    }

    /// Increment a numeric hash field by the given amount.
    fn hincr_by<K: ToRedisArgs, F: ToRedisArgs>(key: K, field: F, delta: i64) {
        cmd("HINCRBY").arg(key).arg(field).arg(delta)
    }

    /// Check whether a hash field exists.
    fn hexists<K: ToRedisArgs, F: ToRedisArgs>(key: K, field: F) {
        cmd("HEXISTS").arg(key).arg(field)
    }

    /// All field names of a hash.
    fn hkeys<K: ToRedisArgs>(key: K) {
        cmd("HKEYS").arg(key)
    }

    /// All values of a hash.
    fn hvals<K: ToRedisArgs>(key: K) {
        cmd("HVALS").arg(key)
    }

    /// Number of fields in a hash.
    fn hlen<K: ToRedisArgs>(key: K) {
        cmd("HLEN").arg(key)
    }

    // -- lists

    /// Prepend values to a list.
    fn lpush<K: ToRedisArgs, V: ToRedisArgs>(key: K, value: V) {
        cmd("LPUSH").arg(key).arg(value)
    }

    /// Append values to a list.
    fn rpush<K: ToRedisArgs, V: ToRedisArgs>(key: K, value: V) {
        cmd("RPUSH").arg(key).arg(value)
    }

    /// Pop from the head of a list.
    fn lpop<K: ToRedisArgs>(key: K) {
        cmd("LPOP").arg(key)
    }

    /// Pop from the tail of a list.
    fn rpop<K: ToRedisArgs>(key: K) {
        cmd("RPOP").arg(key)
    }

    /// Length of a list.
    fn llen<K: ToRedisArgs>(key: K) {
        cmd("LLEN").arg(key)
    }

    /// A range of list elements, inclusive on both ends.
    fn lrange<K: ToRedisArgs>(key: K, start: i64, stop: i64) {
        cmd("LRANGE").arg(key).arg(start).arg(stop)
    }

    /// Remove occurrences of a value from a list.
    fn lrem<K: ToRedisArgs, V: ToRedisArgs>(key: K, count: i64, value: V) {
        cmd("LREM").arg(key).arg(count).arg(value)
    }

    // -- sets

    /// Add members to a set.
    fn sadd<K: ToRedisArgs, M: ToRedisArgs>(key: K, member: M) {
        cmd("SADD").arg(key).arg(member)
    }

    /// Remove members from a set.
    fn srem<K: ToRedisArgs, M: ToRedisArgs>(key: K, member: M) {
        cmd("SREM").arg(key).arg(member)
    }

    /// All members of a set.
    fn smembers<K: ToRedisArgs>(key: K) {
        cmd("SMEMBERS").arg(key)
    }

    /// Cardinality of a set.
    fn scard<K: ToRedisArgs>(key: K) {
        cmd("SCARD").arg(key)
    }

    /// Move a member from one set to another.
    fn smove<S: ToRedisArgs, D: ToRedisArgs, M: ToRedisArgs>(source: S, destination: D, member: M) {
        cmd("SMOVE").arg(source).arg(destination).arg(member)
    }

    /// Intersection of the given sets.
    fn sinter<K: ToRedisArgs>(keys: K) {
        cmd("SINTER").arg(keys)
    }

    /// Union of the given sets.
    fn sunion<K: ToRedisArgs>(keys: K) {
        cmd("SUNION").arg(keys)
    }

    // -- sorted sets

    /// Add a member to a sorted set, or update its score.
    fn zadd<K: ToRedisArgs, M: ToRedisArgs>(key: K, score: f64, member: M) {
        cmd("ZADD").arg(key).arg(score).arg(member)
    }

    /// Remove members from a sorted set.
    fn zrem<K: ToRedisArgs, M: ToRedisArgs>(key: K, member: M) {
        cmd("ZREM").arg(key).arg(member)
    }

    /// A range of sorted-set members by rank, inclusive on both ends.
    fn zrange<K: ToRedisArgs>(key: K, start: i64, stop: i64) {
        cmd("ZRANGE").arg(key).arg(start).arg(stop)
    }

    /// Score of a sorted-set member.
    fn zscore<K: ToRedisArgs, M: ToRedisArgs>(key: K, member: M) {
        cmd("ZSCORE").arg(key).arg(member)
    }

    // -- admin

    /// Remove every key of the current database.
    fn flushdb<>() {
        &mut cmd("FLUSHDB")
    }
}

#[cfg(test)]
mod tests {
    use crate::cmd::Cmd;

    #[test]
    fn constructors_build_expected_wire_form() {
        assert_eq!(
            Cmd::set("k", "v").get_packed_command(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n".to_vec()
        );
        assert_eq!(
            Cmd::ping().get_packed_command(),
            b"*1\r\n$4\r\nPING\r\n".to_vec()
        );
        assert_eq!(
            Cmd::zadd("board", 1.5, "alice").get_packed_command(),
            b"*4\r\n$4\r\nZADD\r\n$5\r\nboard\r\n$3\r\n1.5\r\n$5\r\nalice\r\n".to_vec()
        );
    }

    #[test]
    fn variadic_args_flatten() {
        let packed = Cmd::mget(&["a", "b"][..]).get_packed_command();
        assert_eq!(packed, b"*3\r\n$4\r\nMGET\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec());

        let packed = Cmd::mset(&[("k1", "v1"), ("k2", "v2")][..]).get_packed_command();
        assert_eq!(
            packed,
            b"*5\r\n$4\r\nMSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n$2\r\nk2\r\n$2\r\nv2\r\n".to_vec()
        );
    }
}
