//! Typed, resizable memory-mapped arrays
//!
//! A [`MappedArray`] keeps its elements in a file mapped into memory, either
//! an anonymous temporary file that disappears when the array is dropped or a
//! named file that persists. Capacity grows geometrically; [`MappedArray::flush`]
//! trims the file to the live length so it can be reopened with
//! [`MappedArray::open`].

use crate::{Error, Result};
use bytemuck::Pod;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tracing::trace;

const MIN_CAPACITY: usize = 16;

pub struct MappedArray<T: Pod> {
    file: File,
    path: Option<PathBuf>,
    map: Option<MmapMut>,
    len: usize,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedArray<T> {
    /// Backed by an unnamed temporary file
    pub fn temporary() -> Result<Self> {
        let file = tempfile::tempfile()?;
        Self::with_file(file, None, 0)
    }

    /// Creates (or truncates) a named backing file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Self::with_file(file, Some(path), 0)
    }

    /// Opens an existing file previously written and flushed by [`MappedArray::create`]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let bytes = file.metadata()?.len() as usize;
        if bytes % Self::element_size() != 0 {
            return Err(Error::Collaborator(format!(
                "{} is {} bytes, not a multiple of the {}-byte element size",
                path.display(),
                bytes,
                Self::element_size()
            )));
        }
        Self::with_file(file, Some(path), bytes / Self::element_size())
    }

    fn with_file(file: File, path: Option<PathBuf>, len: usize) -> Result<Self> {
        let mut array = Self {
            file,
            path,
            map: None,
            len,
            capacity: len,
            _marker: PhantomData,
        };
        array.remap()?;
        Ok(array)
    }

    fn element_size() -> usize {
        std::mem::size_of::<T>()
    }

    fn remap(&mut self) -> Result<()> {
        self.map = None;
        if self.capacity == 0 {
            return Ok(());
        }
        // The file is only ever resized by this array, which holds no other view of it.
        let map = unsafe { MmapMut::map_mut(&self.file)? };
        self.map = Some(map);
        Ok(())
    }

    fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        self.map = None;
        self.file
            .set_len((capacity * Self::element_size()) as u64)?;
        trace!(from = self.capacity, to = capacity, "resized mapped array");
        self.capacity = capacity;
        self.remap()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Makes room for at least `additional` more elements
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self.len + additional;
        if required <= self.capacity {
            return Ok(());
        }
        let capacity = required.max(self.capacity * 2).max(MIN_CAPACITY);
        self.set_capacity(capacity)
    }

    /// Grows with zeroed elements or truncates
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if len > self.len {
            self.reserve(len - self.len)?;
            let old = self.len;
            self.len = len;
            self.as_mut_slice()[old..].fill(T::zeroed());
        } else {
            self.len = len;
        }
        Ok(())
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        self.reserve(1)?;
        self.len += 1;
        let last = self.len - 1;
        self.as_mut_slice()[last] = value;
        Ok(())
    }

    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<()> {
        self.reserve(values.len())?;
        let old = self.len;
        self.len += values.len();
        self.as_mut_slice()[old..].copy_from_slice(values);
        Ok(())
    }

    /// Replaces the whole content
    pub fn assign(&mut self, values: &[T]) -> Result<()> {
        self.len = 0;
        self.extend_from_slice(values)
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.map {
            Some(map) => bytemuck::cast_slice(&map[..self.len * Self::element_size()]),
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let bytes = self.len * Self::element_size();
        match &mut self.map {
            Some(map) => bytemuck::cast_slice_mut(&mut map[..bytes]),
            None => &mut [],
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Trims the backing file to the live length and syncs it to disk
    pub fn flush(&mut self) -> Result<()> {
        if self.capacity != self.len {
            self.set_capacity(self.len)?;
        }
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }
}

impl<T: Pod> Deref for MappedArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Pod> DerefMut for MappedArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for MappedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedArray")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
