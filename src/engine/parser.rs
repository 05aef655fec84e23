//! Argument-vector parser: raw argv -> `Command`.
//!
//! This is the dispatcher's resolution step. A parse failure here is the
//! "queue-time error" of the transaction engine: replied immediately, and
//! if the client is inside MULTI the batch is flagged so the eventual EXEC
//! aborts.

use super::command::Command;
use super::db::NUM_DATABASES;
use bytes::Bytes;

fn arg_str(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).to_string()
}

fn arg_i64(arg: &Bytes) -> Result<i64, String> {
    String::from_utf8_lossy(arg)
        .parse::<i64>()
        .map_err(|_| "ERR value is not an integer or out of range".to_string())
}

fn arg_f64(arg: &Bytes) -> Result<f64, String> {
    String::from_utf8_lossy(arg)
        .parse::<f64>()
        .map_err(|_| "ERR value is not a valid float".to_string())
}

fn wrong_arity(name: &str) -> String {
    format!("ERR wrong number of arguments for '{}' command", name.to_lowercase())
}

impl Command {
    /// Resolve a raw argument vector into a command descriptor.
    pub fn parse(argv: &[Bytes]) -> Result<Command, String> {
        let Some(first) = argv.first() else {
            return Err("ERR empty command".to_string());
        };
        let name = String::from_utf8_lossy(first).to_uppercase();
        let args = &argv[1..];

        match name.as_str() {
            "PING" => match args {
                [] => Ok(Command::Ping(None)),
                [msg] => Ok(Command::Ping(Some(msg.clone()))),
                _ => Err(wrong_arity(&name)),
            },
            "ECHO" => match args {
                [msg] => Ok(Command::Echo(msg.clone())),
                _ => Err(wrong_arity(&name)),
            },
            "SELECT" => match args {
                [index] => {
                    let index = String::from_utf8_lossy(index)
                        .parse::<usize>()
                        .map_err(|_| "ERR value is not an integer or out of range".to_string())?;
                    if index >= NUM_DATABASES {
                        return Err("ERR DB index is out of range".to_string());
                    }
                    Ok(Command::Select(index))
                }
                _ => Err(wrong_arity(&name)),
            },
            "DBSIZE" => match args {
                [] => Ok(Command::DbSize),
                _ => Err(wrong_arity(&name)),
            },
            "GET" => match args {
                [key] => Ok(Command::Get(arg_str(key))),
                _ => Err(wrong_arity(&name)),
            },
            "SET" => {
                if args.len() < 2 {
                    return Err(wrong_arity(&name));
                }
                let key = arg_str(&args[0]);
                let value = args[1].clone();
                let mut nx = false;
                let mut xx = false;
                for opt in &args[2..] {
                    match String::from_utf8_lossy(opt).to_uppercase().as_str() {
                        "NX" => nx = true,
                        "XX" => xx = true,
                        _ => return Err("ERR syntax error".to_string()),
                    }
                }
                if nx && xx {
                    return Err(
                        "ERR XX and NX options at the same time are not compatible".to_string()
                    );
                }
                Ok(Command::Set { key, value, nx, xx })
            }
            "GETSET" => match args {
                [key, value] => Ok(Command::GetSet(arg_str(key), value.clone())),
                _ => Err(wrong_arity(&name)),
            },
            "APPEND" => match args {
                [key, value] => Ok(Command::Append(arg_str(key), value.clone())),
                _ => Err(wrong_arity(&name)),
            },
            "STRLEN" => match args {
                [key] => Ok(Command::StrLen(arg_str(key))),
                _ => Err(wrong_arity(&name)),
            },
            "MGET" => {
                if args.is_empty() {
                    return Err(wrong_arity(&name));
                }
                Ok(Command::MGet(args.iter().map(arg_str).collect()))
            }
            "MSET" => {
                if args.is_empty() || args.len() % 2 != 0 {
                    return Err(wrong_arity(&name));
                }
                let pairs = args
                    .chunks_exact(2)
                    .map(|pair| (arg_str(&pair[0]), pair[1].clone()))
                    .collect();
                Ok(Command::MSet(pairs))
            }
            "INCR" => match args {
                [key] => Ok(Command::Incr(arg_str(key))),
                _ => Err(wrong_arity(&name)),
            },
            "DECR" => match args {
                [key] => Ok(Command::Decr(arg_str(key))),
                _ => Err(wrong_arity(&name)),
            },
            "INCRBY" => match args {
                [key, delta] => Ok(Command::IncrBy(arg_str(key), arg_i64(delta)?)),
                _ => Err(wrong_arity(&name)),
            },
            "DECRBY" => match args {
                [key, delta] => Ok(Command::DecrBy(arg_str(key), arg_i64(delta)?)),
                _ => Err(wrong_arity(&name)),
            },
            "INCRBYFLOAT" => match args {
                [key, delta] => {
                    let delta = arg_f64(delta)?;
                    if delta.is_nan() || delta.is_infinite() {
                        return Err("ERR increment would produce NaN or Infinity".to_string());
                    }
                    Ok(Command::IncrByFloat(arg_str(key), delta))
                }
                _ => Err(wrong_arity(&name)),
            },
            "DEL" => {
                if args.is_empty() {
                    return Err(wrong_arity(&name));
                }
                Ok(Command::Del(args.iter().map(arg_str).collect()))
            }
            "EXISTS" => {
                if args.is_empty() {
                    return Err(wrong_arity(&name));
                }
                Ok(Command::Exists(args.iter().map(arg_str).collect()))
            }
            "TYPE" => match args {
                [key] => Ok(Command::TypeOf(arg_str(key))),
                _ => Err(wrong_arity(&name)),
            },
            "FLUSHDB" => match args {
                [] => Ok(Command::FlushDb),
                _ => Err(wrong_arity(&name)),
            },
            "FLUSHALL" => match args {
                [] => Ok(Command::FlushAll),
                _ => Err(wrong_arity(&name)),
            },
            "MULTI" => match args {
                [] => Ok(Command::Multi),
                _ => Err(wrong_arity(&name)),
            },
            "EXEC" => match args {
                [] => Ok(Command::Exec),
                _ => Err(wrong_arity(&name)),
            },
            "DISCARD" => match args {
                [] => Ok(Command::Discard),
                _ => Err(wrong_arity(&name)),
            },
            "WATCH" => {
                if args.is_empty() {
                    return Err(wrong_arity(&name));
                }
                Ok(Command::Watch(args.iter().map(arg_str).collect()))
            }
            "UNWATCH" => match args {
                [] => Ok(Command::Unwatch),
                _ => Err(wrong_arity(&name)),
            },
            "REPLICAOF" | "SLAVEOF" => match args {
                [host, port] => {
                    let host = arg_str(host);
                    let port_str = arg_str(port);
                    if host.eq_ignore_ascii_case("no") && port_str.eq_ignore_ascii_case("one") {
                        return Ok(Command::ReplicaOf(None));
                    }
                    let port = port_str
                        .parse::<u16>()
                        .map_err(|_| "ERR Invalid master port".to_string())?;
                    Ok(Command::ReplicaOf(Some((host, port))))
                }
                _ => Err(wrong_arity(&name)),
            },
            "MONITOR" => match args {
                [] => Ok(Command::Monitor),
                _ => Err(wrong_arity(&name)),
            },
            _ => Err(format!(
                "ERR unknown command '{}'",
                String::from_utf8_lossy(first)
            )),
        }
    }
}
