use std::sync::Arc;

use tracing::debug;

use crate::common::{Document, Value, WindowError};
use crate::runtime::expression::Expression;

/// A maximal run of adjacent documents sharing one partition key.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Index of this partition in the stream.
    pub index: usize,
    /// Position of the first document in the whole input stream.
    pub start_position: usize,
    pub key: Value,
    pub documents: Vec<Document>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Splits a sorted document stream into contiguous partitions.
///
/// Only one partition is buffered at a time: the first document of the next
/// partition is held back until the current one has been handed out.
#[derive(Debug)]
pub struct Partitioner<I> {
    input: I,
    partition_by: Option<Arc<dyn Expression>>,
    max_partition_size: Option<usize>,
    pending: Option<(Value, Document)>,
    position: usize,
    next_index: usize,
    failed: bool,
}

impl<I> Partitioner<I>
where
    I: Iterator<Item = Document>,
{
    pub fn new(input: I, partition_by: Option<Arc<dyn Expression>>) -> Self {
        Self {
            input,
            partition_by,
            max_partition_size: None,
            pending: None,
            position: 0,
            next_index: 0,
            failed: false,
        }
    }

    pub fn with_max_partition_size(mut self, max_partition_size: Option<usize>) -> Self {
        self.max_partition_size = max_partition_size;
        self
    }

    fn partition_key(&self, doc: &Document, position: usize) -> Result<Value, WindowError> {
        let Some(expr) = &self.partition_by else {
            return Ok(Value::Null);
        };
        match expr.evaluate(doc)? {
            Value::Array(_) => Err(WindowError::PartitionKeyArray { position }),
            Value::Missing => Ok(Value::Null),
            key => Ok(key),
        }
    }

    fn pull(&mut self) -> Option<Result<(Value, Document), WindowError>> {
        let doc = self.input.next()?;
        let position = self.position;
        self.position += 1;
        Some(self.partition_key(&doc, position).map(|key| (key, doc)))
    }

    fn next_partition(&mut self) -> Option<Result<Partition, WindowError>> {
        let (key, first) = match self.pending.take() {
            Some(entry) => entry,
            None => match self.pull()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            },
        };

        let index = self.next_index;
        self.next_index += 1;
        let start_position = self.position - 1;
        let mut documents = vec![first];

        while let Some(next) = self.pull() {
            let (next_key, doc) = match next {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            if next_key != key {
                self.pending = Some((next_key, doc));
                break;
            }
            if let Some(max) = self.max_partition_size {
                if documents.len() >= max {
                    return Some(Err(WindowError::PartitionTooLarge { partition: index, max }));
                }
            }
            documents.push(doc);
        }

        debug!(partition = index, docs = documents.len(), key = %key, "buffered partition");
        Some(Ok(Partition {
            index,
            start_position,
            key,
            documents,
        }))
    }
}

impl<I> Iterator for Partitioner<I>
where
    I: Iterator<Item = Document>,
{
    type Item = Result<Partition, WindowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.next_partition();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}
