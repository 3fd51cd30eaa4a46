use sllb::Sketch;
use std::{error::Error, ffi::OsString, fs, io, io::BufRead, process, thread};

/// Count the lines of a file, each line being `TIMESTAMP ITEM`.
fn read(fname: OsString) -> thread::JoinHandle<io::Result<Sketch>> {
    thread::spawn(move || {
        let mut sk = Sketch::default();
        let reader = io::BufReader::new(fs::File::open(&fname)?).lines();
        for (n, line) in reader.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let timestamp = parts
                .next()
                .and_then(|t| t.parse::<u64>().ok())
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "{}:{}: expected `TIMESTAMP ITEM`",
                            fname.to_string_lossy(),
                            n + 1
                        ),
                    )
                })?;
            let item = parts.next().unwrap_or("").trim_start();
            sk.insert_bytes(timestamp, item.as_bytes());
        }
        Ok(sk)
    })
}

fn usage() -> ! {
    eprintln!("Usage: cargo run FILE [FILE...] [-- SINCE...]");
    process::exit(1);
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut fnames = Vec::new();
    let mut cutoffs = Vec::new();
    let mut args = std::env::args_os().skip(1);
    for arg in &mut args {
        if arg == "--" {
            break;
        }
        fnames.push(arg);
    }
    for arg in args {
        match arg.to_str().and_then(|s| s.parse::<u64>().ok()) {
            Some(since) => cutoffs.push(since),
            None => usage(),
        }
    }
    if fnames.is_empty() {
        usage();
    }
    if cutoffs.is_empty() {
        cutoffs.push(0);
    }

    let readers = fnames.into_iter().map(read).collect::<Vec<_>>();
    let mut total: Option<Sketch> = None;
    for reader in readers {
        let sk = reader.join().expect("reader thread panicked")?;
        total = Some(match total.take() {
            None => sk,
            Some(mut total) => {
                total.union(&sk)?;
                total
            }
        });
    }

    if let Some(sk) = total {
        for since in cutoffs {
            println!("since {}: {}", since, sk.estimate(since));
        }
    }
    Ok(())
}
