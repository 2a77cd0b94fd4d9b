//! Lua scripts for the atomic primitives.
//!
//! Every record is a hash with fields `v` (value) and `ver` (version).
//! A TTL argument of 0 means no expiry.

/// Insert if absent.
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = value
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns 1 if the record was created, 0 if it already existed.
pub const CHECK_AND_SET: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'ver', 1)
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return 1
";

/// Unconditional write that still advances the version.
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = value
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns the new version.
pub const SET_VERSIONED: &str = r"
local ver = redis.call('HINCRBY', KEYS[1], 'ver', 1)
redis.call('HSET', KEYS[1], 'v', ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
else
    redis.call('PERSIST', KEYS[1])
end
return ver
";

/// Integer counter held in the `v` field.
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = delta
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns the new counter value.
pub const INCREMENT: &str = r"
local n = redis.call('HINCRBY', KEYS[1], 'v', ARGV[1])
redis.call('HINCRBY', KEYS[1], 'ver', 1)
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return n
";

/// Compare-and-swap on the version field.
///
/// KEYS\[1\] = record key
/// ARGV\[1\] = expected version (0 = create only if absent)
/// ARGV\[2\] = new value
/// ARGV\[3\] = TTL in milliseconds
///
/// Returns `[1, new_ver]` on success or `[0, cur_ver, cur_val]` on conflict.
pub const COMPARE_AND_SWAP: &str = r"
local expected = tonumber(ARGV[1])
local ttl = tonumber(ARGV[3])
if redis.call('EXISTS', KEYS[1]) == 0 then
    if expected ~= 0 then
        return {0, 0, false}
    end
    redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', 1)
    if ttl > 0 then
        redis.call('PEXPIRE', KEYS[1], ttl)
    end
    return {1, 1}
end
local cur_ver = tonumber(redis.call('HGET', KEYS[1], 'ver'))
if cur_ver ~= expected then
    return {0, cur_ver, redis.call('HGET', KEYS[1], 'v')}
end
local new_ver = cur_ver + 1
redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', new_ver)
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return {1, new_ver}
";
