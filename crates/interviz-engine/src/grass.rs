//! GRASS GIS engine adapter.
//!
//! Every operation runs one GRASS module as a child process. The session
//! (database, location, mapset) is selected through the `GISRC` file of the
//! [`EngineSpace`], so sessions with different mapsets never share a region.

use async_trait::async_trait;
use interviz_core::error::{InterVizError, Result};
use interviz_core::models::{RasterExtent, Region};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::ports::{Engine, EngineSpace, SunmaskRequest, ViewshedRequest};

/// Refraction coefficient of visible light
const REFRACTION_COEFF: &str = "0.14286";

/// Memory budget of `r.viewshed`, in MB
const VIEWSHED_MEMORY_MB: u32 = 1000;

#[derive(Debug, Clone)]
pub struct GrassEngine {
    launcher: String,
    gisbase: PathBuf,
}

impl GrassEngine {
    pub fn new(launcher: impl Into<String>, gisbase: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            gisbase: gisbase.into(),
        }
    }

    /// Locate the GRASS installation by asking the launcher (`grass --config path`)
    pub async fn discover(launcher: &str) -> Result<Self> {
        let output = Command::new(launcher)
            .args(["--config", "path"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                InterVizError::bootstrap(format!("cannot run '{}': {}", launcher, e))
            })?;

        if !output.status.success() {
            return Err(InterVizError::bootstrap(format!(
                "'{} --config path' failed: {}",
                launcher,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let gisbase = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if gisbase.is_empty() {
            return Err(InterVizError::bootstrap(format!(
                "'{} --config path' returned no installation path",
                launcher
            )));
        }

        tracing::info!("Using GRASS installation at {}", gisbase);
        Ok(Self::new(launcher, gisbase))
    }

    fn module(&self, space: &EngineSpace, name: &str) -> Command {
        let mut command = Command::new(self.gisbase.join("bin").join(name));
        command
            .env("GISBASE", &self.gisbase)
            .env("GISRC", &space.gisrc)
            .env("PATH", self.search_path("PATH", &["bin", "scripts"]))
            .env("LD_LIBRARY_PATH", self.search_path("LD_LIBRARY_PATH", &["lib"]))
            .env("GRASS_MESSAGE_FORMAT", "plain")
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// GRASS directories prepended to an inherited search path variable
    fn search_path(&self, variable: &str, dirs: &[&str]) -> String {
        let mut entries: Vec<String> =
            dirs.iter().map(|d| self.gisbase.join(d).display().to_string()).collect();
        if let Ok(inherited) = std::env::var(variable) {
            if !inherited.is_empty() {
                entries.push(inherited);
            }
        }
        entries.join(":")
    }

    async fn run(&self, space: &EngineSpace, name: &str, args: &[String]) -> Result<String> {
        tracing::debug!("{} {} (mapset {})", name, args.join(" "), space.mapset);

        let output = self
            .module(space, name)
            .args(args)
            .output()
            .await
            .map_err(|e| InterVizError::computation(name, e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(InterVizError::computation(name, diagnostic(&stderr, &output.status)));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!("{}: {}", name, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Tool diagnostics, or the exit status when the tool printed nothing
fn diagnostic(stderr: &str, status: &std::process::ExitStatus) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", status)
    } else {
        stderr.to_string()
    }
}

fn arg(key: &str, value: impl std::fmt::Display) -> String {
    format!("{}={}", key, value)
}

#[async_trait]
impl Engine for GrassEngine {
    async fn create_location(
        &self,
        gisdbase: &Path,
        location: &str,
        extent: &RasterExtent,
        raster: &Path,
    ) -> Result<()> {
        // Without an EPSG code the location takes the raster's own CRS
        let georef = match extent.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => raster.display().to_string(),
        };
        let location_path = gisdbase.join(location);

        let output = Command::new(&self.launcher)
            .arg("-c")
            .arg(&georef)
            .arg("-e")
            .arg(&location_path)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                InterVizError::bootstrap(format!("cannot run '{}': {}", self.launcher, e))
            })?;

        if !output.status.success() {
            return Err(InterVizError::bootstrap(format!(
                "location creation from {} failed: {}",
                georef,
                diagnostic(&String::from_utf8_lossy(&output.stderr), &output.status)
            )));
        }

        tracing::info!("Created location {} ({})", location_path.display(), georef);
        Ok(())
    }

    async fn link_raster(&self, space: &EngineSpace, raster: &Path, layer: &str) -> Result<()> {
        self.run(
            space,
            "r.external",
            &[
                "-o".to_string(),
                arg("input", raster.display()),
                arg("band", 1),
                arg("output", layer),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_region(&self, space: &EngineSpace, region: &Region) -> Result<()> {
        self.run(
            space,
            "g.region",
            &[
                arg("n", region.north),
                arg("s", region.south),
                arg("e", region.east),
                arg("w", region.west),
                arg("nsres", region.nsres),
                arg("ewres", region.ewres),
            ],
        )
        .await?;
        Ok(())
    }

    async fn viewshed(&self, space: &EngineSpace, request: &ViewshedRequest) -> Result<()> {
        self.run(
            space,
            "r.viewshed",
            &[
                "-b".to_string(),
                arg("input", &request.elevation),
                arg("output", &request.output),
                arg("coordinates", request.coord),
                arg("observer_elevation", request.observer_height),
                arg("target_elevation", request.target_height),
                arg("max_distance", request.max_distance),
                arg("refraction_coeff", REFRACTION_COEFF),
                arg("memory", VIEWSHED_MEMORY_MB),
            ],
        )
        .await?;
        Ok(())
    }

    async fn sunmask(&self, space: &EngineSpace, request: &SunmaskRequest) -> Result<()> {
        let dt = request.datetime;
        self.run(
            space,
            "r.sunmask",
            &[
                arg("elevation", &request.elevation),
                arg("output", &request.output),
                arg("year", dt.year),
                arg("month", dt.month),
                arg("day", dt.day),
                arg("hour", dt.hour),
                arg("minute", dt.minute),
                arg("timezone", request.timezone),
            ],
        )
        .await?;
        Ok(())
    }

    async fn export_raster(&self, space: &EngineSpace, layer: &str, output: &Path) -> Result<()> {
        self.run(
            space,
            "r.out.ascii",
            &[
                arg("input", layer),
                arg("output", output.display()),
                arg("null_value", "*"),
            ],
        )
        .await?;
        Ok(())
    }

    async fn remove_raster(&self, space: &EngineSpace, layer: &str) -> Result<()> {
        self.run(
            space,
            "g.remove",
            &["-f".to_string(), arg("type", "raster"), arg("name", layer)],
        )
        .await?;
        Ok(())
    }
}
