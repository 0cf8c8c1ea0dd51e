use crate::pattern::Pattern;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::watch;
use vmprobe_core::ConsoleStream;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct Reply {
    trigger: Vec<u8>,
    delay: Duration,
    output: Vec<u8>,
}

/// A scripted guest behind a console stream.
///
/// The guest prints its banner on connect, then answers each trigger in
/// order: once the input it has received (after the previous trigger)
/// contains the next trigger, it writes the matching output.
#[derive(Debug, Clone, Default)]
pub struct FakeGuest {
    banner: Vec<u8>,
    banner_delay: Duration,
    replies: VecDeque<Reply>,
    hang_up: bool,
}

impl FakeGuest {
    pub fn new() -> Self {
        Self::default()
    }

    /// An Alpine guest that boots to a root shell.
    pub fn alpine() -> Self {
        Self::new()
            .banner("\nWelcome to Alpine Linux 3.7\nKernel 4.9.65-1-virthardened on an x86_64 (/dev/ttyS0)\n\n")
            .on("\n", "localhost login: ")
            .on("root\n", "Welcome to Alpine!\n\nlocalhost:~# ")
    }

    pub fn banner(mut self, text: impl Into<Vec<u8>>) -> Self {
        self.banner = text.into();
        self
    }

    /// Holds the banner back for `delay`, like a slow boot.
    pub fn boot_delay(mut self, delay: Duration) -> Self {
        self.banner_delay = delay;
        self
    }

    pub fn on(self, trigger: impl Into<Vec<u8>>, output: impl Into<Vec<u8>>) -> Self {
        self.on_after(trigger, Duration::ZERO, output)
    }

    pub fn on_after(
        mut self,
        trigger: impl Into<Vec<u8>>,
        delay: Duration,
        output: impl Into<Vec<u8>>,
    ) -> Self {
        self.replies.push_back(Reply {
            trigger: trigger.into(),
            delay,
            output: output.into(),
        });
        self
    }

    /// Closes the console after the last reply.
    pub fn hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }

    /// Starts the guest and returns the host end of its console.
    pub fn spawn(self) -> (ConsoleStream, GuestHandle) {
        let (host, guest) = duplex(PIPE_CAPACITY);
        let received = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = watch::channel(false);
        tokio::spawn(serve(guest, self, Arc::clone(&received), tx));
        (
            Box::new(host),
            GuestHandle {
                received,
                disconnected: rx,
            },
        )
    }
}

/// Observes a running [`FakeGuest`].
#[derive(Debug, Clone)]
pub struct GuestHandle {
    received: Arc<Mutex<Vec<u8>>>,
    disconnected: watch::Receiver<bool>,
}

impl GuestHandle {
    /// Everything the host has sent so far.
    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_text(&self) -> String {
        String::from_utf8_lossy(&self.received()).into_owned()
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.borrow()
    }

    /// Waits until the host side of the console is closed.
    pub async fn wait_disconnected(&self, within: Duration) -> bool {
        let mut rx = self.disconnected.clone();
        tokio::time::timeout(within, rx.wait_for(|closed| *closed))
            .await
            .is_ok_and(|r| r.is_ok())
    }
}

async fn serve(
    mut io: DuplexStream,
    mut script: FakeGuest,
    received: Arc<Mutex<Vec<u8>>>,
    disconnected: watch::Sender<bool>,
) {
    if !script.banner_delay.is_zero() {
        tokio::time::sleep(script.banner_delay).await;
    }
    if !script.banner.is_empty() && io.write_all(&script.banner).await.is_err() {
        let _ = disconnected.send(true);
        return;
    }

    let mut searched = 0usize;
    let mut buf = [0u8; 1024];
    loop {
        while let Some(reply) = script.replies.front() {
            let hit = {
                let input = received.lock().unwrap();
                Pattern::literal(reply.trigger.clone()).find(&input[searched..])
            };
            let Some(range) = hit else { break };
            searched += range.end;
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            if io.write_all(&reply.output).await.is_err() {
                let _ = disconnected.send(true);
                return;
            }
            script.replies.pop_front();
        }

        if script.replies.is_empty() && script.hang_up {
            return;
        }

        match io.read(&mut buf).await {
            Ok(0) | Err(_) => {
                let _ = disconnected.send(true);
                return;
            }
            Ok(n) => received.lock().unwrap().extend_from_slice(&buf[..n]),
        }
    }
}
