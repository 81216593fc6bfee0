//! Basic usage example for the postbox mail server
//!
//! This example starts a server on an ephemeral port with two in-memory
//! users, then drives a complete client conversation over the wire: log in,
//! send a message, list the receiver's mailbox, read the message and delete
//! it again.

use postbox::{MailConfig, MailServer, StaticCredentials};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

fn main() {
    println!("Postbox Basic Usage Example");
    println!("===========================");

    let dir = std::env::temp_dir().join(format!("postbox-demo-{}", std::process::id()));
    let config = MailConfig {
        addr: "127.0.0.1:0".to_string(),
        spool_dir: dir.join("spool"),
        ban_file: dir.join("blacklist.txt"),
        workers: 2,
    };
    let auth = Arc::new(
        StaticCredentials::new()
            .with_user("alice", "secret")
            .with_user("bob", "hunter2"),
    );

    let server = match MailServer::new(config, auth) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to set up server: {e}");
            return;
        }
    };
    let handle = server.shutdown_handle();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let server_thread = thread::spawn(move || {
        if let Err(e) = server.serve(listener) {
            eprintln!("Server error: {e}");
        }
    });

    println!("Server started on {addr}");
    println!("Spool directory: {}", dir.join("spool").display());

    println!("\nSending a message as alice...");
    if let Err(e) = send_as_alice(&addr.to_string()) {
        eprintln!("Failed to send message: {e}");
        return;
    }

    println!("\nReading the mailbox as bob...");
    if let Err(e) = read_as_bob(&addr.to_string()) {
        eprintln!("Failed to read mailbox: {e}");
        return;
    }

    println!("\nShutting down...");
    handle.shutdown();
    let _ = server_thread.join();
    println!("Done.");
}

fn send_as_alice(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(addr)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    // Read greeting
    let mut response = String::new();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    // Log in
    writeln!(stream, "LOGIN")?;
    writeln!(stream, "alice")?;
    writeln!(stream, "secret")?;
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    // Send a message to bob
    writeln!(stream, "SEND")?;
    writeln!(stream, "bob")?;
    writeln!(stream, "Greetings")?;
    writeln!(stream, "Hi Bob,")?;
    writeln!(stream, "this message was delivered by the example program.")?;
    writeln!(stream, ".")?; // End of message marker
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    // Close the session; QUIT has no response line
    writeln!(stream, "QUIT")?;
    Ok(())
}

fn read_as_bob(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(addr)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    // Read greeting
    let mut response = String::new();
    reader.read_line(&mut response)?;

    // Log in
    writeln!(stream, "LOGIN")?;
    writeln!(stream, "bob")?;
    writeln!(stream, "hunter2")?;
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    // List the mailbox
    writeln!(stream, "LIST")?;
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");
    let count: usize = response
        .trim()
        .strip_prefix("Number of emails: ")
        .unwrap_or("0")
        .parse()?;
    for _ in 0..count {
        response.clear();
        reader.read_line(&mut response)?;
        print!("S: {response}");
    }

    // Read the first message; it spans a known number of lines
    writeln!(stream, "READ")?;
    writeln!(stream, "1")?;
    for _ in 0..5 {
        response.clear();
        reader.read_line(&mut response)?;
        print!("S: {response}");
    }

    // Delete it
    writeln!(stream, "DEL")?;
    writeln!(stream, "1")?;
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    writeln!(stream, "QUIT")?;
    Ok(())
}
