//! End-to-end tests against a scripted server on the loopback interface.
//!
//! Each test spawns a thread that accepts one connection, checks the exact
//! request bytes and answers with a canned response.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use modbus_tcp_client::{
    BlockOp, BlockRange, BlockReply, ModbusError, ModbusTcpClient, ProtocolError,
};

/// Start a one-shot server and return its port.
fn serve<F>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream);
    });
    (port, handle)
}

/// Read one request frame using its length field.
fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = vec![0u8; 6];
    stream.read_exact(&mut frame).unwrap();
    let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
    let mut rest = vec![0u8; length];
    stream.read_exact(&mut rest).unwrap();
    frame.extend_from_slice(&rest);
    frame
}

fn open(port: u16) -> ModbusTcpClient {
    ModbusTcpClient::open("127.0.0.1", port).unwrap()
}

#[test]
fn test_read_holding_registers() {
    let (port, server) = serve(|mut stream| {
        let request = read_request(&mut stream);
        assert_eq!(
            request,
            [0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x02]
        );
        stream
            .write_all(&[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02,
            ])
            .unwrap();
    });

    let mut client = open(port);
    assert_eq!(client.read_holding_registers(0, 2).unwrap(), vec![1, 2]);
    assert_eq!(client.stats().requests_sent, 1);
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_write_multiple_registers_echo() {
    let (port, server) = serve(|mut stream| {
        let request = read_request(&mut stream);
        assert_eq!(
            request,
            [
                0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x01, 0x10, 0x00, 0x0A, 0x00, 0x01, 0x02,
                0x00, 0x2A
            ]
        );
        stream
            .write_all(&[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x0A, 0x00, 0x01,
            ])
            .unwrap();
    });

    let mut client = open(port);
    let values = [42u16];
    client.write_multiple_registers(10, &values).unwrap();
    assert_eq!(values, [42]);
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_silent_server_times_out() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (port, server) = serve(move |mut stream| {
        read_request(&mut stream);
        // Hold the connection open without answering
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
    });

    let mut client = open(port);
    client.set_response_timeout_ms(200);

    let started = Instant::now();
    let err = client.read_holding_registers(0, 1).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ModbusError::Timeout { .. }), "got {:?}", err);
    assert!(elapsed >= Duration::from_millis(150), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);
    assert!(client.is_desynchronized());

    // Later calls fail without touching the socket
    let err = client.read_holding_registers(0, 1).unwrap_err();
    assert!(matches!(err, ModbusError::Transport { .. }));

    done_tx.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn test_exception_response() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream
            .write_all(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02])
            .unwrap();

        // The connection stays usable after an exception
        read_request(&mut stream);
        stream
            .write_all(&[
                0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x12, 0x34,
            ])
            .unwrap();
    });

    let mut client = open(port);
    let err = client.read_holding_registers(0xFFF0, 1).unwrap_err();
    assert!(err.is_exception());
    assert_eq!(err.exception_code(), Some(0x02));
    assert!(!client.is_desynchronized());

    assert_eq!(client.read_holding_registers(0, 1).unwrap(), vec![0x1234]);
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_byte_count_mismatch() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream
            .write_all(&[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02,
            ])
            .unwrap();
    });

    let mut client = open(port);
    let err = client.read_holding_registers(0, 2).unwrap_err();
    assert_eq!(
        err,
        ModbusError::Protocol(ProtocolError::ByteCountMismatch {
            expected: 4,
            actual: 6
        })
    );
    assert!(client.is_desynchronized());
    drop(client);
    server.join().unwrap();
}

#[test]
fn test_response_in_small_chunks() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        let response = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x01, 0x03, 0x06, 0x00, 0x0A, 0x00, 0x0B, 0x00,
            0x0C,
        ];
        for chunk in response.chunks(4) {
            stream.write_all(chunk).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
        }
    });

    let mut client = open(port);
    assert_eq!(client.read_holding_registers(0, 3).unwrap(), vec![10, 11, 12]);
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_peer_closes_mid_response() {
    let (port, server) = serve(|mut stream| {
        read_request(&mut stream);
        stream
            .write_all(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00])
            .unwrap();
    });

    let mut client = open(port);
    let err = client.read_holding_registers(0, 2).unwrap_err();
    assert!(err.is_transport_error(), "got {:?}", err);
    assert!(client.is_desynchronized());
    server.join().unwrap();
}

#[test]
fn test_multiblock_read() {
    let (port, server) = serve(|mut stream| {
        let request = read_request(&mut stream);
        assert_eq!(
            request,
            [
                0x00, 0x00, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x65, 0x02, 0x00, 0x10, 0x00, 0x01,
                0x00, 0x20, 0x00, 0x02
            ]
        );
        let mut response = request.clone();
        // Length grows by two bytes per register
        response[5] = 0x0B + 6;
        response.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
        stream.write_all(&response).unwrap();
    });

    let mut client = open(port);
    let values = client
        .read_multiblock_registers(&[BlockRange::new(0x10, 1), BlockRange::new(0x20, 2)])
        .unwrap();
    assert_eq!(values, vec![1, 2, 3]);
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_multiblock_read_write() {
    let (port, server) = serve(|mut stream| {
        let request = read_request(&mut stream);
        assert_eq!(&request[6..10], &[0x01, 0x68, 0x00, 0x02]);
        // Read descriptor
        assert_eq!(&request[10..18], &[0xC3, 0xC3, 0x00, 0x03, 0x00, 0x40, 0x00, 0x02]);
        // Write descriptor and data
        assert_eq!(
            &request[18..28],
            &[0x3C, 0x3C, 0x00, 0x04, 0x00, 0x50, 0x00, 0x01, 0x00, 0x07]
        );
        stream
            .write_all(&[
                0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x68, 0x00, 0x02, // envelope
                0x00, 0x00, 0xAB, 0xCD, 0x00, 0x01, // read
                0x00, 0x00, // write
            ])
            .unwrap();
    });

    let mut client = open(port);
    let data = [7u16];
    let replies = client
        .read_write_multiblock_registers(&[BlockOp::read(3, 0x40, 2), BlockOp::write(4, 0x50, &data)])
        .unwrap();
    assert_eq!(
        replies,
        vec![BlockReply::Read(vec![0xABCD, 0x0001]), BlockReply::Written]
    );
    client.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_open_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = ModbusTcpClient::open("127.0.0.1", port).err().unwrap();
    assert!(matches!(err, ModbusError::Connection { .. }));
    assert!(err.is_connection_error());
    assert!(!err.is_transport_error());
}
