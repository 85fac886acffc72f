//! Hands the word cut by each partition boundary to the downstream worker.
//!
//! Worker `r` owns the sending end of the channel to `r + 1` and the receiving end
//! of the channel from `r - 1`. A fragment travels as its length, followed by the
//! bytes when the length is non-zero.

use bytes::{Bytes, BytesMut};
use log::debug;
use tokio::sync::mpsc::{channel, Receiver, Sender};

use crate::error::{CountError, Result};
use crate::tokenize::is_word_byte;

const LINK_CAPACITY: usize = 2;

#[derive(Debug)]
pub enum BoundaryMessage {
    Length(usize),
    Payload(Bytes),
}

/// The two channel ends of one worker. The first worker has no upstream,
/// the last no downstream.
pub struct BoundaryLink {
    rank: usize,
    upstream: Option<Receiver<BoundaryMessage>>,
    downstream: Option<Sender<BoundaryMessage>>,
}

/// The buffer a worker tokenizes after stitching.
#[derive(Debug, PartialEq, Eq)]
pub struct Stitched {
    /// Bytes received from upstream, now at the front of `text`.
    pub head_len: usize,
    pub text: Bytes,
}

/// Links for `workers` workers chained rank 0 -> 1 -> ... -> workers - 1.
pub fn chain(workers: usize) -> Vec<BoundaryLink> {
    let mut links: Vec<BoundaryLink> = (0..workers)
        .map(|rank| BoundaryLink {
            rank,
            upstream: None,
            downstream: None,
        })
        .collect();
    for rank in 1..workers {
        let (tx, rx) = channel(LINK_CAPACITY);
        links[rank - 1].downstream = Some(tx);
        links[rank].upstream = Some(rx);
    }
    links
}

/// Start of the trailing alphanumeric run of `buffer`; `buffer.len()` if there is none.
pub fn trailing_run_start(buffer: &[u8]) -> usize {
    buffer
        .iter()
        .rposition(|&c| !is_word_byte(c))
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn lowercase(fragment: &[u8]) -> Bytes {
    Bytes::from(fragment.to_ascii_lowercase())
}

fn concat(head: &Bytes, tail: Bytes) -> Bytes {
    if head.is_empty() {
        return tail;
    }
    let mut joined = BytesMut::with_capacity(head.len() + tail.len());
    joined.extend_from_slice(head);
    joined.extend_from_slice(&tail);
    joined.freeze()
}

impl BoundaryLink {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub async fn send_fragment(&mut self, fragment: Bytes) -> Result<()> {
        let tx = match self.downstream.take() {
            Some(tx) => tx,
            None => return Ok(()),
        };
        let len = fragment.len();
        debug!("rank {}: sending {}B fragment downstream", self.rank, len);
        send(&tx, BoundaryMessage::Length(len)).await?;
        if len > 0 {
            send(&tx, BoundaryMessage::Payload(fragment)).await?;
        }
        Ok(())
    }

    pub async fn recv_fragment(&mut self) -> Result<Bytes> {
        let mut rx = match self.upstream.take() {
            Some(rx) => rx,
            None => return Ok(Bytes::new()),
        };
        let len = match rx.recv().await {
            Some(BoundaryMessage::Length(len)) => len,
            Some(other) => {
                return Err(CountError::Protocol(format!(
                    "rank {}: expected fragment length, got {:?}",
                    self.rank, other
                )))
            }
            None => {
                return Err(CountError::Protocol(format!(
                    "rank {}: predecessor hung up before sending its fragment",
                    self.rank
                )))
            }
        };
        if len == 0 {
            return Ok(Bytes::new());
        }
        match rx.recv().await {
            Some(BoundaryMessage::Payload(fragment)) if fragment.len() == len => Ok(fragment),
            Some(BoundaryMessage::Payload(fragment)) => Err(CountError::Protocol(format!(
                "rank {}: announced {}B fragment, received {}B",
                self.rank,
                len,
                fragment.len()
            ))),
            Some(other) => Err(CountError::Protocol(format!(
                "rank {}: expected fragment payload, got {:?}",
                self.rank, other
            ))),
            None => Err(CountError::Protocol(format!(
                "rank {}: predecessor hung up after announcing {}B fragment",
                self.rank, len
            ))),
        }
    }

    /// Sends this worker's trailing word downstream and prepends the one received
    /// from upstream. A buffer that is one unbroken word (or empty) may continue a
    /// word from further upstream, so it is forwarded whole after the receive.
    pub async fn stitch(&mut self, buffer: Bytes) -> Result<Stitched> {
        if self.downstream.is_none() {
            let head = self.recv_fragment().await?;
            return Ok(Stitched {
                head_len: head.len(),
                text: concat(&head, buffer),
            });
        }

        let tail_start = trailing_run_start(&buffer);
        if tail_start == 0 {
            let head = self.recv_fragment().await?;
            self.send_fragment(lowercase(&concat(&head, buffer))).await?;
            return Ok(Stitched {
                head_len: 0,
                text: Bytes::new(),
            });
        }

        self.send_fragment(lowercase(&buffer[tail_start..])).await?;
        let head = self.recv_fragment().await?;
        Ok(Stitched {
            head_len: head.len(),
            text: concat(&head, buffer.slice(..tail_start)),
        })
    }
}

async fn send(tx: &Sender<BoundaryMessage>, msg: BoundaryMessage) -> Result<()> {
    tx.send(msg)
        .await
        .map_err(|_| CountError::Protocol("successor hung up before receiving fragment".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stitch_all(parts: &[&str]) -> Vec<Stitched> {
        let handles: Vec<_> = chain(parts.len())
            .into_iter()
            .zip(parts.iter())
            .map(|(mut link, part)| {
                let buffer = Bytes::copy_from_slice(part.as_bytes());
                tokio::spawn(async move { link.stitch(buffer).await })
            })
            .collect();
        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.await.unwrap().unwrap());
        }
        out
    }

    fn text(s: &Stitched) -> &str {
        std::str::from_utf8(&s.text).unwrap()
    }

    #[test]
    fn finds_trailing_run() {
        assert_eq!(trailing_run_start(b"the cat sa"), 8);
        assert_eq!(trailing_run_start(b"the cat "), 8);
        assert_eq!(trailing_run_start(b"word"), 0);
        assert_eq!(trailing_run_start(b""), 0);
    }

    #[tokio::test]
    async fn word_split_mid_way_moves_downstream() {
        let out = stitch_all(&["the cat sa", "t on the mat"]).await;
        assert_eq!(text(&out[0]), "the cat ");
        assert_eq!(out[0].head_len, 0);
        assert_eq!(text(&out[1]), "sat on the mat");
        assert_eq!(out[1].head_len, 2);
    }

    #[tokio::test]
    async fn boundary_after_separator_sends_empty_fragment() {
        let out = stitch_all(&["the cat ", "sat"]).await;
        assert_eq!(text(&out[0]), "the cat ");
        assert_eq!(text(&out[1]), "sat");
        assert_eq!(out[1].head_len, 0);
    }

    #[tokio::test]
    async fn fragment_is_lowercased() {
        let out = stitch_all(&["a Ca", "T b"]).await;
        assert_eq!(text(&out[1]), "caT b");
    }

    #[tokio::test]
    async fn word_spanning_several_partitions_is_forwarded() {
        let out = stitch_all(&["x abc", "def", "", "ghi", "jk y"]).await;
        assert_eq!(text(&out[0]), "x ");
        assert!(out[1].text.is_empty());
        assert!(out[2].text.is_empty());
        assert!(out[3].text.is_empty());
        assert_eq!(text(&out[4]), "abcdefghijk y");
        assert_eq!(out[4].head_len, 9);
    }

    #[tokio::test]
    async fn single_worker_keeps_buffer() {
        let out = stitch_all(&["all mine"]).await;
        assert_eq!(text(&out[0]), "all mine");
    }

    #[tokio::test]
    async fn short_payload_is_a_protocol_error() {
        let (tx, rx) = channel(LINK_CAPACITY);
        let mut link = BoundaryLink {
            rank: 1,
            upstream: Some(rx),
            downstream: None,
        };
        tx.send(BoundaryMessage::Length(4)).await.unwrap();
        tx.send(BoundaryMessage::Payload(Bytes::from_static(b"ab"))).await.unwrap();
        assert!(matches!(link.recv_fragment().await, Err(CountError::Protocol(_))));
    }

    #[tokio::test]
    async fn dropped_predecessor_is_a_protocol_error() {
        let mut links = chain(2);
        let mut last = links.pop().unwrap();
        drop(links);
        assert!(matches!(
            last.stitch(Bytes::from_static(b"abc")).await,
            Err(CountError::Protocol(_))
        ));
    }
}
