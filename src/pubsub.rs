use crate::{
    client::{ClientId, ReplyMessage},
    glob,
    reply::Reply,
};
use bytes::Bytes;
use hashbrown::HashMap;
use tokio::sync::mpsc;

/// A handle for delivering message frames to a subscribed connection.
#[derive(Clone, Debug)]
pub struct Subscriber {
    pub id: ClientId,
    sender: mpsc::UnboundedSender<ReplyMessage>,
}

impl Subscriber {
    pub fn new(id: ClientId, sender: mpsc::UnboundedSender<ReplyMessage>) -> Self {
        Subscriber { id, sender }
    }

    fn send(&self, reply: Reply) {
        _ = self.sender.send(ReplyMessage::Reply(reply));
    }
}

/// Channel and pattern subscription tables. Confirmation frames are the
/// caller's job; this only routes published messages.
#[derive(Debug, Default)]
pub struct Pubsub {
    channels: HashMap<Bytes, Vec<Subscriber>>,
    patterns: HashMap<Bytes, Vec<Subscriber>>,
}

fn add(table: &mut HashMap<Bytes, Vec<Subscriber>>, name: Bytes, subscriber: Subscriber) {
    let subscribers = table.entry(name).or_default();
    if !subscribers.iter().any(|existing| existing.id == subscriber.id) {
        subscribers.push(subscriber);
    }
}

fn remove(table: &mut HashMap<Bytes, Vec<Subscriber>>, name: &[u8], id: ClientId) {
    if let Some(subscribers) = table.get_mut(name) {
        subscribers.retain(|subscriber| subscriber.id != id);
        if subscribers.is_empty() {
            table.remove(name);
        }
    }
}

impl Pubsub {
    pub fn subscribe(&mut self, channel: Bytes, subscriber: Subscriber) {
        add(&mut self.channels, channel, subscriber);
    }

    pub fn unsubscribe(&mut self, channel: &[u8], id: ClientId) {
        remove(&mut self.channels, channel, id);
    }

    pub fn psubscribe(&mut self, pattern: Bytes, subscriber: Subscriber) {
        add(&mut self.patterns, pattern, subscriber);
    }

    pub fn punsubscribe(&mut self, pattern: &[u8], id: ClientId) {
        remove(&mut self.patterns, pattern, id);
    }

    /// Drop every subscription a connection holds.
    pub fn disconnect(&mut self, id: ClientId) {
        self.channels.retain(|_, subscribers| {
            subscribers.retain(|subscriber| subscriber.id != id);
            !subscribers.is_empty()
        });
        self.patterns.retain(|_, subscribers| {
            subscribers.retain(|subscriber| subscriber.id != id);
            !subscribers.is_empty()
        });
    }

    /// Fan a message out to direct and pattern subscribers. Returns the
    /// number of deliveries.
    pub fn publish(&self, channel: &[u8], message: &Bytes) -> usize {
        let mut count = 0;

        if let Some(subscribers) = self.channels.get(channel) {
            for subscriber in subscribers {
                subscriber.send(Reply::Array(3));
                subscriber.send(Reply::Bulk(Bytes::from_static(b"message")));
                subscriber.send(Reply::Bulk(Bytes::copy_from_slice(channel)));
                subscriber.send(Reply::Bulk(message.clone()));
                count += 1;
            }
        }

        for (pattern, subscribers) in &self.patterns {
            if !glob::matches(channel, pattern) {
                continue;
            }
            for subscriber in subscribers {
                subscriber.send(Reply::Array(4));
                subscriber.send(Reply::Bulk(Bytes::from_static(b"pmessage")));
                subscriber.send(Reply::Bulk(pattern.clone()));
                subscriber.send(Reply::Bulk(Bytes::copy_from_slice(channel)));
                subscriber.send(Reply::Bulk(message.clone()));
                count += 1;
            }
        }

        count
    }

    /// Channels with at least one subscriber, optionally filtered.
    pub fn channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        self.channels
            .keys()
            .filter(|channel| pattern.is_none_or(|pattern| glob::matches(channel, pattern)))
            .cloned()
            .collect()
    }

    pub fn numsub(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    pub fn numpat(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;

    fn subscriber(id: i64) -> (Subscriber, mpsc::UnboundedReceiver<ReplyMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Subscriber::new(ClientId(id), sender), receiver)
    }

    fn frames(receiver: &mut mpsc::UnboundedReceiver<ReplyMessage>) -> usize {
        let mut count = 0;
        while receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn direct_delivery() {
        let mut pubsub = Pubsub::default();
        let (a, mut a_rx) = subscriber(1);
        let (b, mut b_rx) = subscriber(2);
        pubsub.subscribe(Bytes::from("news"), a);
        pubsub.subscribe(Bytes::from("news"), b);

        assert_eq!(pubsub.publish(b"news", &Bytes::from("hi")), 2);
        assert_eq!(frames(&mut a_rx), 4);
        assert_eq!(frames(&mut b_rx), 4);
        assert_eq!(pubsub.publish(b"other", &Bytes::from("hi")), 0);
    }

    #[test]
    fn pattern_delivery() {
        let mut pubsub = Pubsub::default();
        let (a, mut a_rx) = subscriber(1);
        pubsub.psubscribe(Bytes::from("news.*"), a);

        assert_eq!(pubsub.publish(b"news.tech", &Bytes::from("hi")), 1);
        assert_eq!(frames(&mut a_rx), 5);
        assert_eq!(pubsub.publish(b"sports", &Bytes::from("hi")), 0);
    }

    #[test]
    fn duplicate_subscriptions_deliver_once() {
        let mut pubsub = Pubsub::default();
        let (a, mut a_rx) = subscriber(1);
        pubsub.subscribe(Bytes::from("c"), a.clone());
        pubsub.subscribe(Bytes::from("c"), a);
        assert_eq!(pubsub.publish(b"c", &Bytes::from("m")), 1);
        assert_eq!(frames(&mut a_rx), 4);
    }

    #[test]
    fn disconnect_clears_everything() {
        let mut pubsub = Pubsub::default();
        let (a, _a_rx) = subscriber(1);
        pubsub.subscribe(Bytes::from("c"), a.clone());
        pubsub.psubscribe(Bytes::from("p*"), a);
        pubsub.disconnect(ClientId(1));
        assert_eq!(pubsub.numsub(b"c"), 0);
        assert_eq!(pubsub.numpat(), 0);
        assert!(pubsub.channels(None).is_empty());
    }

    #[test]
    fn introspection() {
        let mut pubsub = Pubsub::default();
        let (a, _a_rx) = subscriber(1);
        let (b, _b_rx) = subscriber(2);
        pubsub.subscribe(Bytes::from("news"), a.clone());
        pubsub.subscribe(Bytes::from("news"), b);
        pubsub.subscribe(Bytes::from("tech"), a.clone());
        pubsub.psubscribe(Bytes::from("n*"), a);

        assert_eq!(pubsub.numsub(b"news"), 2);
        assert_eq!(pubsub.numsub(b"tech"), 1);
        assert_eq!(pubsub.numpat(), 1);
        let mut channels = pubsub.channels(None);
        channels.sort();
        assert_eq!(channels, vec![Bytes::from("news"), Bytes::from("tech")]);
        assert_eq!(pubsub.channels(Some(b"n*")), vec![Bytes::from("news")]);
    }
}
