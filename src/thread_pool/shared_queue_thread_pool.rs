use std::io::Result;
use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;

use super::ThreadPool;

use crossbeam::channel::{self, Receiver, Sender};

enum Message {
    Run(Box<dyn FnOnce() + Send + 'static>),
    Shutdown,
}
pub struct SharedQueueThreadPool {
    sender: Sender<Message>,
    threads: Vec<JoinHandle<()>>,
}

impl Drop for SharedQueueThreadPool {
    fn drop(&mut self) {
        for _ in 0..self.threads.len() {
            let _ = self.sender.send(Message::Shutdown);
        }
        while !self.threads.is_empty() {
            self.threads.pop().unwrap().join().unwrap();
        }
    }
}

impl SharedQueueThreadPool {
    fn thread_main(receiver: Receiver<Message>) {
        loop {
            match receiver.recv() {
                Ok(Message::Run(f)) => {
                    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| f()));
                }
                Ok(Message::Shutdown) | Err(_) => {
                    return;
                }
            }
        }
    }
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(thread_count: u16) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        let mut threads = Vec::new();

        for _ in 0..thread_count {
            let r = receiver.clone();
            threads.push(std::thread::spawn(move || SharedQueueThreadPool::thread_main(r)));
        }

        Ok(SharedQueueThreadPool { sender, threads })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.sender.send(Message::Run(Box::new(job)));
    }
}
