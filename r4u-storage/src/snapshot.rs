// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Disk snapshot helpers. Sync I/O: the storage layer does not depend on an
//! async runtime, matching the teacher's documented storage convention.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::Path;

pub fn write_snapshot<T: Serialize>(dir: &Path, name: &str, rows: &[(u64, T)]) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}.json"));
    let tmp_path = dir.join(format!("{name}.json.tmp"));
    let bytes = serde_json::to_vec_pretty(rows)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(tmp_path, path)?;
    Ok(())
}

pub fn read_snapshot<T: DeserializeOwned>(dir: &Path, name: &str) -> io::Result<Vec<(u64, T)>> {
    let path = dir.join(format!("{name}.json"));
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
