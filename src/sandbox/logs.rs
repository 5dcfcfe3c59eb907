use std::io::{BufRead, BufReader, Read};
use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Line(String),
    /// Nothing arrived within the wait.
    Pending,
    /// The producing process is gone and every line has been read.
    Closed,
}

/// Lazy sequence of log lines from one sandbox.
///
/// Lines from stdout and stderr are merged in arrival order. The stream ends
/// when both pipes reach EOF and cannot be restarted.
pub struct LogStream {
    rx: Receiver<String>,
    follower: Option<Child>,
}

impl LogStream {
    /// Read lines from the given pipes on background threads.
    pub fn from_pipes<O, E>(stdout: Option<O>, stderr: Option<E>) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        if let Some(out) = stdout {
            spawn_line_reader(out, tx.clone());
        }
        if let Some(err) = stderr {
            spawn_line_reader(err, tx);
        }
        Self { rx, follower: None }
    }

    /// Stream the output of a follower process such as `docker logs --follow`.
    /// The follower is killed when the stream is dropped.
    pub fn follow(mut child: Child) -> Self {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stream = Self::from_pipes(stdout, stderr);
        stream.follower = Some(child);
        stream
    }

    /// A stream that is already finished, yielding `lines` first.
    pub fn closed(lines: Vec<String>) -> Self {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            let _ = tx.send(line);
        }
        Self { rx, follower: None }
    }

    pub fn next_line(&mut self, timeout: Duration) -> LogEvent {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => LogEvent::Line(line),
            Err(RecvTimeoutError::Timeout) => LogEvent::Pending,
            Err(RecvTimeoutError::Disconnected) => LogEvent::Closed,
        }
    }

    /// Non-blocking variant of [`next_line`](Self::next_line).
    pub fn try_next_line(&mut self) -> LogEvent {
        match self.rx.try_recv() {
            Ok(line) => LogEvent::Line(line),
            Err(TryRecvError::Empty) => LogEvent::Pending,
            Err(TryRecvError::Disconnected) => LogEvent::Closed,
        }
    }
}

impl Iterator for LogStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.rx.recv().ok()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.follower.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn spawn_line_reader<R>(pipe: R, tx: Sender<String>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn test_closed_stream_yields_then_closes() {
        let mut stream = LogStream::closed(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(stream.next_line(Duration::from_millis(10)), LogEvent::Line("a".into()));
        assert_eq!(stream.try_next_line(), LogEvent::Line("b".into()));
        assert_eq!(stream.next_line(Duration::from_millis(10)), LogEvent::Closed);
    }

    #[test]
    fn test_pipes_merge_stdout_and_stderr() {
        let mut child = Command::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stream = LogStream::from_pipes(child.stdout.take(), child.stderr.take());
        let mut lines: Vec<String> = stream.collect();
        child.wait().unwrap();
        lines.sort();
        assert_eq!(lines, vec!["err".to_string(), "out".to_string()]);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut child = Command::new("sh")
            .args(["-c", "printf 'windows\\r\\n'"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stream = LogStream::from_pipes(child.stdout.take(), None::<std::process::ChildStderr>);
        let lines: Vec<String> = stream.collect();
        child.wait().unwrap();
        assert_eq!(lines, vec!["windows".to_string()]);
    }

    #[test]
    fn test_follow_kills_follower_on_drop() {
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let mut stream = LogStream::follow(child);
        assert_eq!(stream.next_line(Duration::from_millis(20)), LogEvent::Pending);
        drop(stream);
    }
}
