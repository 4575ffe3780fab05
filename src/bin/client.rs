use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Terminal chat client: prints everything the server relays, forwards each
/// stdin line, and quits on "sair" or "/quit".
/// Usage: `chat-relay-client [host:port]`
#[tokio::main]
async fn main() {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    println!("=== Chat client ===");
    println!("Connecting to {}...", addr);

    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("❌ Connection to {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };
    let (reader_half, mut writer_half) = stream.into_split();

    // Prints server traffic until the server closes the stream.
    let mut receiver = tokio::spawn(async move {
        let mut lines = BufReader::new(reader_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => println!("📨 {}", line),
                Ok(None) => {
                    println!("❌ Server closed the connection");
                    break;
                }
                Err(e) => {
                    eprintln!("❌ Error reading from server: {}", e);
                    break;
                }
            }
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            maybe_line = input.next_line() => {
                match maybe_line {
                    Ok(Some(line)) => {
                        let text = line.trim_end();
                        if text.is_empty() {
                            continue;
                        }
                        if writer_half
                            .write_all(format!("{}\n", text).as_bytes())
                            .await
                            .is_err()
                        {
                            break;
                        }
                        if text == "sair" || text == "/quit" {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            _ = &mut receiver => break,
        }
    }

    let _ = writer_half.shutdown().await;
}
