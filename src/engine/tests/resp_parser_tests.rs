//! RESP parser and encoder tests.

use super::super::resp::{encode_command_frame, request_argv, RespParser, RespValue};
use super::argv;

fn parse_one(input: &[u8]) -> (RespValue, usize) {
    RespParser::parse(input)
        .expect("parse should not error")
        .expect("input should be complete")
}

#[test]
fn test_parse_simple_string() {
    let (value, consumed) = parse_one(b"+OK\r\n");
    assert_eq!(value, RespValue::SimpleString("OK".to_string()));
    assert_eq!(consumed, 5);
}

#[test]
fn test_parse_error() {
    let (value, _) = parse_one(b"-ERR boom\r\n");
    assert_eq!(value, RespValue::Error("ERR boom".to_string()));
}

#[test]
fn test_parse_integer() {
    let (value, _) = parse_one(b":42\r\n");
    assert_eq!(value, RespValue::Integer(42));
    let (value, _) = parse_one(b":-7\r\n");
    assert_eq!(value, RespValue::Integer(-7));
}

#[test]
fn test_parse_bulk_string() {
    let (value, consumed) = parse_one(b"$5\r\nhello\r\n");
    assert_eq!(value, RespValue::BulkString(Some(b"hello".to_vec())));
    assert_eq!(consumed, 11);
}

#[test]
fn test_parse_null_bulk_string() {
    let (value, _) = parse_one(b"$-1\r\n");
    assert_eq!(value, RespValue::BulkString(None));
}

#[test]
fn test_parse_array() {
    let (value, _) = parse_one(b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    assert_eq!(
        value,
        RespValue::Array(Some(vec![
            RespValue::BulkString(Some(b"GET".to_vec())),
            RespValue::BulkString(Some(b"key".to_vec())),
        ]))
    );
}

#[test]
fn test_parse_null_array() {
    let (value, _) = parse_one(b"*-1\r\n");
    assert_eq!(value, RespValue::Array(None));
}

#[test]
fn test_incomplete_input_is_not_an_error() {
    assert_eq!(RespParser::parse(b""), Ok(None));
    assert_eq!(RespParser::parse(b"+OK"), Ok(None));
    assert_eq!(RespParser::parse(b"$5\r\nhel"), Ok(None));
    assert_eq!(RespParser::parse(b"*2\r\n$3\r\nGET\r\n"), Ok(None));
}

#[test]
fn test_malformed_input_is_an_error() {
    assert!(RespParser::parse(b"?what\r\n").is_err());
    assert!(RespParser::parse(b"$abc\r\n").is_err());
    assert!(RespParser::parse(b"$-2\r\n").is_err());
}

#[test]
fn test_encode_round_trip() {
    let values = vec![
        RespValue::ok(),
        RespValue::err("ERR nope"),
        RespValue::Integer(-3),
        RespValue::bulk(b"payload".to_vec()),
        RespValue::nil(),
        RespValue::null_array(),
        RespValue::Array(Some(vec![RespValue::Integer(1), RespValue::bulk(b"x".to_vec())])),
    ];
    for value in values {
        let encoded = RespParser::encode(&value);
        let (decoded, consumed) = parse_one(&encoded);
        assert_eq!(decoded, value);
        assert_eq!(consumed, encoded.len());
    }
}

#[test]
fn test_encode_command_frame_is_wire_format() {
    let frame = encode_command_frame(&argv(&["SET", "a", "1"]));
    assert_eq!(frame, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n");
}

#[test]
fn test_request_argv_extraction() {
    let (value, _) = parse_one(b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n");
    let args = request_argv(&value).expect("valid request");
    assert_eq!(args.len(), 2);
    assert_eq!(&args[0][..], b"ECHO");
    assert_eq!(&args[1][..], b"hi");

    // Non-array and empty-array requests are protocol errors.
    assert!(request_argv(&RespValue::Integer(1)).is_err());
    assert!(request_argv(&RespValue::Array(Some(vec![]))).is_err());
}
