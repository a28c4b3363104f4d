use std::path::Path;

use figment::{
    providers::{Data, Format, Json, Yaml},
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// A file-backed provider whose contents are read once, at load time.
///
/// Figment's own file providers re-read the file every time data is requested. Configuration for a run is meant to be
/// a fixed snapshot, so the file is parsed eagerly and the resulting data is handed out on every request.
pub struct FileSnapshotProvider {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl FileSnapshotProvider {
    pub fn from_yaml<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_format::<Yaml, _>(path, "YAML file")
    }

    pub fn from_json<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_format::<Json, _>(path, "JSON file")
    }

    fn from_format<F, P>(path: P, kind: &'static str) -> Result<Self, Error>
    where
        F: Format,
        P: AsRef<Path>,
    {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read '{}': {}", path.as_ref().display(), e))?;
        let data = Data::<F>::string(&contents).data()?;

        Ok(Self {
            data,
            metadata: Metadata::from(kind, path.as_ref()),
        })
    }
}

impl Provider for FileSnapshotProvider {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}
