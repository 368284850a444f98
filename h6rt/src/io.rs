use std::io;
use std::ops::Deref;
use std::path::Path;

/// Owns a module's bytes for its whole lifetime: a memory map when the
/// `memmap2` feature is enabled, a plain heap buffer otherwise.
///
/// Mirrors the teacher workspace's own `Assembly::from_path`
/// mmap-vs-`std::fs::read` split, generalized into a reusable loader so
/// `h6rt-cli` (the crate's only I/O boundary) doesn't need to special-case
/// the feature itself.
pub enum ModuleBytes {
	#[cfg(feature = "memmap2")]
	Mapped(memmap2::Mmap),
	Owned(Vec<u8>),
}

impl Deref for ModuleBytes {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		match self {
			#[cfg(feature = "memmap2")]
			ModuleBytes::Mapped(m) => m.as_ref(),
			ModuleBytes::Owned(v) => v.as_slice(),
		}
	}
}

#[cfg(feature = "memmap2")]
#[cfg_attr(feature = "tracing", tracing::instrument)]
pub fn read_module_file(path: impl AsRef<Path> + std::fmt::Debug) -> io::Result<ModuleBytes> {
	let file = std::fs::File::open(path)?;
	let mapped = unsafe { memmap2::Mmap::map(&file)? };
	Ok(ModuleBytes::Mapped(mapped))
}

#[cfg(not(feature = "memmap2"))]
#[cfg_attr(feature = "tracing", tracing::instrument)]
pub fn read_module_file(path: impl AsRef<Path> + std::fmt::Debug) -> io::Result<ModuleBytes> {
	Ok(ModuleBytes::Owned(std::fs::read(path)?))
}
