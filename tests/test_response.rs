use herald::http::response::{StatusCode, header_block};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
}

#[test]
fn test_ok_header_block_carries_date() {
    // 1994-11-06 08:49:37 UTC
    let now = UNIX_EPOCH + Duration::from_secs(784111777);
    let block = header_block(StatusCode::Ok, now);

    assert_eq!(
        block,
        b"HTTP/1.0 200 OK\r\nDate: Sun, 06 Nov 1994 08:49:37 GMT\r\n\r\n".to_vec()
    );
}

#[test]
fn test_not_found_header_block_has_no_date() {
    let block = header_block(StatusCode::NotFound, SystemTime::now());

    assert_eq!(block, b"HTTP/1.0 404 Not Found\r\n\r\n".to_vec());
}

#[test]
fn test_header_block_ends_with_blank_line() {
    for status in [StatusCode::Ok, StatusCode::NotFound] {
        let block = header_block(status, SystemTime::now());
        assert!(block.ends_with(b"\r\n\r\n"));
        assert_eq!(block.windows(4).filter(|w| *w == b"\r\n\r\n").count(), 1);
    }
}
