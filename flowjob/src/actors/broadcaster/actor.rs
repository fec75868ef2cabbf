use super::messages::Message;
use crate::events::Output;
use crate::types::OutputBlob;

use tokio::select;
use tokio::sync::mpsc;

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<Message>,
    output_rx: mpsc::UnboundedReceiver<Output>,
    output_buffer: Vec<Output>,
    subscribers: Vec<mpsc::UnboundedSender<OutputBlob>>,
    output_pending: bool,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<Message>,
        output_rx: mpsc::UnboundedReceiver<Output>,
    ) {
        let actor = Actor {
            inbox,
            output_rx,
            output_buffer: Vec::new(),
            subscribers: Vec::new(),
            output_pending: true,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        loop {
            select! {
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(Message::Subscribe { subscriber }) => self.subscribe(subscriber),
                        // no handles left, nobody can subscribe again
                        None => break,
                    }
                }
                maybe_output = self.output_rx.recv(), if self.output_pending => {
                    match maybe_output {
                        Some(output) => {
                            let blob = output.blob().clone();
                            self.output_buffer.push(output);
                            self.subscribers.retain(|sub| {
                                // only retain subscribers who have not dropped
                                sub.send(blob.clone()).is_ok()
                            });
                        }
                        None => {
                            // dropping the senders closes every subscriber's stream
                            self.subscribers.clear();
                            self.output_pending = false;
                        }
                    }
                }
            }
        }
    }

    fn subscribe(&mut self, subscriber: mpsc::UnboundedSender<OutputBlob>) {
        for output in &self.output_buffer {
            if subscriber.send(output.blob().clone()).is_err() {
                return;
            }
        }
        if self.output_pending {
            self.subscribers.push(subscriber);
        }
    }
}
