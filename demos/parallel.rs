//! Count unique items of a `TIMESTAMP ITEM` file on several threads.
//!
//! Each worker owns a `Sketch`, so no locking is needed while counting; the
//! sketches are merged with `union` at the end.

use crossbeam::channel;
use sllb::Sketch;
use std::{env, io, io::BufRead, process, thread};

const WORKERS: usize = 8;

/// Split `inp` at `\n`, dropping the line terminators.
fn byte_lines(inp: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut inp = inp;
    std::iter::from_fn(move || {
        if inp.is_empty() {
            return None;
        }
        let ending = memchr::memchr(b'\n', inp).unwrap_or(inp.len() - 1) + 1;
        let (mut line, rest) = inp.split_at(ending);
        inp = rest;
        if let Some(b'\n') = line.last() {
            line = &line[..line.len() - 1];
            if let Some(b'\r') = line.last() {
                line = &line[..line.len() - 1];
            }
        }
        Some(line)
    })
}

/// Feed one chunk of complete lines into `sk`; returns the number of skipped lines.
fn count_chunk(sk: &mut Sketch, chunk: &[u8]) -> usize {
    let mut skipped = 0;
    for line in byte_lines(chunk) {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let split = memchr::memchr2(b' ', b'\t', line).unwrap_or(line.len());
        let (timestamp, item) = line.split_at(split);
        let timestamp = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|t| t.parse::<u64>().ok());
        match timestamp {
            Some(t) => sk.insert_bytes(t, item.get(1..).unwrap_or(&[])),
            None => skipped += 1,
        }
    }
    skipped
}

fn main() -> io::Result<()> {
    let mut args = env::args_os().skip(1);
    let fname = match args.next() {
        Some(fname) => fname,
        None => {
            eprintln!("Usage: cargo run --release --example parallel FILENAME [SINCE...]");
            process::exit(1);
        }
    };
    let mut cutoffs = args
        .filter_map(|s| s.to_str().and_then(|s| s.parse::<u64>().ok()))
        .collect::<Vec<_>>();
    if cutoffs.is_empty() {
        cutoffs.push(0);
    }

    let (sender, recv) = channel::bounded::<Vec<u8>>(WORKERS + 1);
    let workers = (0..WORKERS)
        .map(|_| {
            let recv = recv.clone();
            thread::spawn(move || {
                let mut sk = Sketch::default();
                let mut skipped = 0;
                for chunk in recv {
                    skipped += count_chunk(&mut sk, &chunk);
                }
                (sk, skipped)
            })
        })
        .collect::<Vec<_>>();

    // Main thread does i/o and hands out chunks that end on a line boundary.
    let mut reader = io::BufReader::with_capacity(512 * 1024, std::fs::File::open(fname)?);
    loop {
        let mut chunk = Vec::new();
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();
        chunk.extend_from_slice(buf);
        reader.consume(len);
        reader.read_until(b'\n', &mut chunk)?;
        sender.send(chunk).expect("workers are alive");
    }
    drop(sender);

    let (total, skipped) = workers
        .into_iter()
        .map(|w| w.join().expect("worker panicked"))
        .fold((Sketch::default(), 0), |(mut total, skipped), (sk, s)| {
            total.union(&sk).expect("all workers use the default config");
            (total, skipped + s)
        });

    if skipped > 0 {
        eprintln!("Skipped {} malformed lines", skipped);
    }
    for since in cutoffs {
        println!("since {}: {}", since, total.estimate(since));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_not_malformed() {
        let mut sk = Sketch::default();
        let skipped = count_chunk(&mut sk, b"1 alice\n\n  \r\n2 bob\n\n");
        assert_eq!(skipped, 0);

        let mut expected = Sketch::default();
        expected.insert_bytes(1, b"alice");
        expected.insert_bytes(2, b"bob");
        assert_eq!(sk.registers(), expected.registers());
    }

    #[test]
    fn lines_without_timestamp_are_skipped() {
        let mut sk = Sketch::default();
        assert_eq!(count_chunk(&mut sk, b"alice\n3 carol\nx bob"), 2);

        let mut expected = Sketch::default();
        expected.insert_bytes(3, b"carol");
        assert_eq!(sk.registers(), expected.registers());
    }
}
