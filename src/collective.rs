//! Collective operations between a group of in-process workers.
//!
//! Rank 0 coordinates. Every other rank owns one ordered channel to it and
//! contributes to each collective exactly once, in the same order as every other
//! rank, so the coordinator can receive rank by rank.

use bytes::BytesMut;
use log::debug;
use tokio::sync::mpsc::{channel, Receiver, Sender};

use crate::char_count::CharTally;
use crate::codec::{SerializedStream, ELEMENT_SIZE};
use crate::error::{CountError, Result};

pub const COORDINATOR: usize = 0;
const CONTRIBUTION_CAPACITY: usize = 4;

#[derive(Debug)]
pub enum Contribution {
    Chars(CharTally),
    StreamLen(usize),
    Stream(SerializedStream),
}

impl Contribution {
    fn kind(&self) -> &'static str {
        match *self {
            Contribution::Chars(_) => "character tally",
            Contribution::StreamLen(_) => "stream length",
            Contribution::Stream(_) => "stream payload",
        }
    }
}

enum Role {
    Coordinator { members: Vec<Receiver<Contribution>> },
    Member { coordinator: Sender<Contribution> },
}

pub struct Communicator {
    rank: usize,
    size: usize,
    role: Role,
}

/// Receive offset of every rank and the total size, both in elements.
pub fn displacements(counts: &[usize]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(counts.len());
    let mut total = 0;
    for &count in counts {
        offsets.push(total);
        total += count;
    }
    (offsets, total)
}

impl Communicator {
    /// One communicator per rank of a group of `size` workers.
    pub fn group(size: usize) -> Vec<Communicator> {
        assert!(size > 0);
        let mut members = Vec::with_capacity(size - 1);
        let mut comms = Vec::with_capacity(size);
        for rank in 1..size {
            let (tx, rx) = channel(CONTRIBUTION_CAPACITY);
            members.push(rx);
            comms.push(Communicator {
                rank,
                size,
                role: Role::Member { coordinator: tx },
            });
        }
        comms.insert(
            0,
            Communicator {
                rank: COORDINATOR,
                size,
                role: Role::Coordinator { members },
            },
        );
        comms
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR
    }

    async fn contribute(&self, contribution: Contribution) -> Result<()> {
        match self.role {
            Role::Member { ref coordinator } => {
                let kind = contribution.kind();
                coordinator.send(contribution).await.map_err(|_| {
                    CountError::Protocol(format!(
                        "rank {}: coordinator hung up before receiving {}",
                        self.rank, kind
                    ))
                })
            }
            Role::Coordinator { .. } => Ok(()),
        }
    }

    /// Receives the next contribution of every member, in rank order.
    async fn collect(&mut self, expected: &'static str) -> Result<Vec<Contribution>> {
        let members = match self.role {
            Role::Coordinator { ref mut members } => members,
            Role::Member { .. } => return Ok(Vec::new()),
        };
        let mut received = Vec::with_capacity(members.len());
        for (i, rx) in members.iter_mut().enumerate() {
            match rx.recv().await {
                Some(contribution) => received.push(contribution),
                None => {
                    return Err(CountError::Protocol(format!(
                        "rank {} hung up before sending its {}",
                        i + 1,
                        expected
                    )))
                }
            }
        }
        Ok(received)
    }

    /// Element-wise sum of every rank's tally, available at the coordinator only.
    pub async fn reduce_chars(&mut self, local: CharTally) -> Result<Option<CharTally>> {
        if !self.is_coordinator() {
            self.contribute(Contribution::Chars(local)).await?;
            return Ok(None);
        }
        let mut global = local;
        for (i, contribution) in self.collect("character tally").await?.into_iter().enumerate() {
            match contribution {
                Contribution::Chars(tally) => global += &tally,
                other => return Err(unexpected(i + 1, "character tally", &other)),
            }
        }
        Ok(Some(global))
    }

    /// Every rank's value in rank order, available at the coordinator only.
    pub async fn gather_lengths(&mut self, local: usize) -> Result<Option<Vec<usize>>> {
        if !self.is_coordinator() {
            self.contribute(Contribution::StreamLen(local)).await?;
            return Ok(None);
        }
        let mut lengths = Vec::with_capacity(self.size);
        lengths.push(local);
        for (i, contribution) in self.collect("stream length").await?.into_iter().enumerate() {
            match contribution {
                Contribution::StreamLen(len) => lengths.push(len),
                other => return Err(unexpected(i + 1, "stream length", &other)),
            }
        }
        Ok(Some(lengths))
    }

    /// Variable-length gather. Sizes are exchanged first, then every stream is
    /// copied into one buffer at its rank's offset. The coordinator gets the
    /// concatenation in rank order.
    pub async fn gather_streams(&mut self, local: SerializedStream) -> Result<Option<SerializedStream>> {
        let counts = self.gather_lengths(local.elements()).await?;
        if !self.is_coordinator() {
            self.contribute(Contribution::Stream(local)).await?;
            return Ok(None);
        }
        let counts = match counts {
            Some(counts) => counts,
            None => return Ok(None),
        };

        let (offsets, total) = displacements(&counts);
        debug!(
            "gathering {} elements from {} ranks: counts {:?} offsets {:?}",
            total, self.size, counts, offsets
        );
        let mut buffer = BytesMut::zeroed(total * ELEMENT_SIZE);
        place(&mut buffer, COORDINATOR, &local, counts[0], offsets[0])?;
        for (i, contribution) in self.collect("stream payload").await?.into_iter().enumerate() {
            let rank = i + 1;
            match contribution {
                Contribution::Stream(stream) => {
                    place(&mut buffer, rank, &stream, counts[rank], offsets[rank])?
                }
                other => return Err(unexpected(rank, "stream payload", &other)),
            }
        }
        Ok(Some(SerializedStream::from_bytes(buffer.freeze())))
    }
}

fn place(
    buffer: &mut BytesMut,
    rank: usize,
    stream: &SerializedStream,
    announced: usize,
    offset: usize,
) -> Result<()> {
    let bytes = stream.as_bytes();
    if bytes.len() != announced * ELEMENT_SIZE {
        return Err(CountError::Protocol(format!(
            "rank {} announced {} elements, sent {} bytes",
            rank,
            announced,
            bytes.len()
        )));
    }
    let start = offset * ELEMENT_SIZE;
    buffer[start..start + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn unexpected(rank: usize, expected: &str, got: &Contribution) -> CountError {
    CountError::Protocol(format!(
        "rank {}: expected {}, got {}",
        rank,
        expected,
        got.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes};

    fn stream_of(elements: &[u64]) -> SerializedStream {
        let mut buf = BytesMut::new();
        for e in elements {
            buf.put_u64_le(*e);
        }
        SerializedStream::from_bytes(buf.freeze())
    }

    #[test]
    fn displacements_are_prefix_sums() {
        assert_eq!(displacements(&[3, 0, 5, 0]), (vec![0, 3, 3, 8], 8));
        assert_eq!(displacements(&[0, 0]), (vec![0, 0], 0));
        assert_eq!(displacements(&[]), (vec![], 0));
    }

    #[tokio::test]
    async fn reduce_sums_every_rank() {
        let texts = ["aab", "", "b~", "zz z"];
        let handles: Vec<_> = Communicator::group(texts.len())
            .into_iter()
            .zip(texts.iter())
            .map(|(mut comm, text)| {
                let tally = CharTally::count(text.as_bytes());
                tokio::spawn(async move { comm.reduce_chars(tally).await })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(results[0], Some(CharTally::count(b"aabb~zz z")));
        assert!(results[1..].iter().all(|r| r.is_none()));
    }

    #[tokio::test]
    async fn gather_places_uneven_streams_in_rank_order() {
        let streams = vec![
            stream_of(&[1, 2]),
            stream_of(&[]),
            stream_of(&[3, 4, 5]),
            stream_of(&[]),
            stream_of(&[6]),
        ];
        let expected = stream_of(&[1, 2, 3, 4, 5, 6]);
        let handles: Vec<_> = Communicator::group(streams.len())
            .into_iter()
            .zip(streams.into_iter())
            .map(|(mut comm, stream)| tokio::spawn(async move { comm.gather_streams(stream).await }))
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(results[0], Some(expected));
        assert!(results[1..].iter().all(|r| r.is_none()));
    }

    #[tokio::test]
    async fn single_rank_gathers_its_own_stream() {
        let mut comms = Communicator::group(1);
        let mut comm = comms.pop().unwrap();
        let stream = stream_of(&[9, 8, 7]);
        assert_eq!(comm.gather_streams(stream.clone()).await.unwrap(), Some(stream));
    }

    #[tokio::test]
    async fn payload_size_mismatch_is_a_protocol_error() {
        let mut comms = Communicator::group(2);
        let member = comms.pop().unwrap();
        let mut coordinator = comms.pop().unwrap();
        member.contribute(Contribution::StreamLen(2)).await.unwrap();
        let short = SerializedStream::from_bytes(Bytes::from_static(&[0u8; 8]));
        member.contribute(Contribution::Stream(short)).await.unwrap();
        let result = coordinator.gather_streams(SerializedStream::default()).await;
        assert!(matches!(result, Err(CountError::Protocol(_))));
    }

    #[tokio::test]
    async fn lost_member_is_a_protocol_error() {
        let mut comms = Communicator::group(3);
        let mut coordinator = comms.remove(0);
        drop(comms);
        let result = coordinator.reduce_chars(CharTally::new()).await;
        assert!(matches!(result, Err(CountError::Protocol(_))));
    }
}
