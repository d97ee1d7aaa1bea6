//! A4 report layout with printpdf.
//!
//! Positions are given from the top-left corner in millimetres and flipped
//! to PDF coordinates when drawn.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{bar_values, build_table_rows, CountPage, GraphPage, TableRow};
use crate::api::AggregationRow;
use crate::utils::{format_count_with_separator, wrap_text};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 10.0;
const BOTTOM_MARGIN: f32 = 15.0;

const REGULAR_FONT_FILE: &str = "avenir-book.ttf";
const BOLD_FONT_FILE: &str = "avenir-black.ttf";
const FOOTER_IMAGE_FILE: &str = "footer-img.png";
const WHITE_LOGO_FILE: &str = "bd2020logowhite.png";
const BLUE_LOGO_FILE: &str = "bd2020logoblue.png";

/// Logo position shared by the title and graph pages
const LOGO_X: f32 = 166.0;
const LOGO_Y: f32 = 278.0;
const LOGO_WIDTH: f32 = 33.0;

/// Inventory names longer than this are cut on the title page
const TITLE_MAX_CHARS: usize = 20;

const BAR_COLORS: [(u8, u8, u8); 5] = [
    (0x3C, 0x84, 0xC1),
    (0x5D, 0xC3, 0xC7),
    (0x53, 0xB0, 0x06),
    (0xEE, 0xAE, 0x68),
    (0xDD, 0x60, 0x69),
];

const CRIMSON: (u8, u8, u8) = (153, 30, 50);
const PALE_PINK: (u8, u8, u8) = (230, 199, 204);
const WHITE: (u8, u8, u8) = (255, 255, 255);
const BLACK: (u8, u8, u8) = (0, 0, 0);
const SLATE: (u8, u8, u8) = (44, 56, 69);
const HEADER_FILL: (u8, u8, u8) = (0xF3, 0xF4, 0xF5);
const STRIPE_FILL: (u8, u8, u8) = (0xF0, 0xFA, 0xFA);
const GRID: (u8, u8, u8) = (0xDD, 0xDD, 0xDD);

const BODY_SIZE: f32 = 11.0;
const LINE_HEIGHT: f32 = 5.0;
const BODY_WRAP: usize = 100;

const CHART_HEIGHT: f32 = 60.0;
const ROW_HEIGHT: f32 = 6.0;
const NAME_COLUMN: f32 = 133.0;
const COUNT_COLUMN: f32 = 28.5;

fn color((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        None,
    ))
}

/// Rough width of a string in millimetres, for centring and right alignment
fn text_width(text: &str, size: f32) -> f32 {
    // Average glyph advance of a proportional sans-serif is about half the em
    text.chars().count() as f32 * size * 0.5 * 0.3528
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Fonts {
    /// Brand fonts from the resource directory, built-in Helvetica otherwise
    fn load(doc: &PdfDocumentReference, resource_dir: &Path) -> Result<Self> {
        Ok(Self {
            regular: load_font(doc, &resource_dir.join(REGULAR_FONT_FILE), BuiltinFont::Helvetica)?,
            bold: load_font(doc, &resource_dir.join(BOLD_FONT_FILE), BuiltinFont::HelveticaBold)?,
        })
    }
}

fn load_font(
    doc: &PdfDocumentReference,
    path: &Path,
    fallback: BuiltinFont,
) -> Result<IndirectFontRef> {
    if path.is_file() {
        debug!("Using font {}", path.display());
        let file =
            File::open(path).with_context(|| format!("Failed to open font {}", path.display()))?;
        doc.add_external_font(file)
            .map_err(|e| anyhow::anyhow!("Failed to load font {}: {}", path.display(), e))
    } else {
        doc.add_builtin_font(fallback)
            .map_err(|e| anyhow::anyhow!("Failed to load built-in font: {}", e))
    }
}

/// Optional brand images from the resource directory
struct Artwork {
    footer: Option<ImageXObject>,
    white_logo: Option<ImageXObject>,
    blue_logo: Option<ImageXObject>,
}

impl Artwork {
    fn load(resource_dir: &Path) -> Result<Self> {
        Ok(Self {
            footer: load_png(&resource_dir.join(FOOTER_IMAGE_FILE))?,
            white_logo: load_png(&resource_dir.join(WHITE_LOGO_FILE))?,
            blue_logo: load_png(&resource_dir.join(BLUE_LOGO_FILE))?,
        })
    }
}

/// Decode a PNG, or `None` when the file does not exist
fn load_png(path: &Path) -> Result<Option<ImageXObject>> {
    if !path.is_file() {
        debug!("No image at {}, skipping", path.display());
        return Ok(None);
    }
    let file =
        File::open(path).with_context(|| format!("Failed to open image {}", path.display()))?;
    let decoder = PngDecoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to decode image {}", path.display()))?;
    let image = Image::try_from(decoder)
        .with_context(|| format!("Failed to decode image {}", path.display()))?;
    if image.image.width.0 == 0 || image.image.height.0 == 0 {
        anyhow::bail!("Image {} is empty", path.display());
    }
    debug!("Using image {}", path.display());
    Ok(Some(image.image))
}

/// Layer of one page with top-left based drawing helpers
struct Canvas {
    layer: PdfLayerReference,
}

impl Canvas {
    fn text(&self, text: &str, size: f32, x: f32, y: f32, font: &IndirectFontRef, rgb: (u8, u8, u8)) {
        self.layer.set_fill_color(color(rgb));
        self.layer
            .use_text(text, size, Mm(x), Mm(PAGE_HEIGHT - y), font);
    }

    fn centered_text(&self, text: &str, size: f32, y: f32, font: &IndirectFontRef, rgb: (u8, u8, u8)) {
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(MARGIN);
        self.text(text, size, x, y, font, rgb);
    }

    fn rect(&self, x: f32, y: f32, width: f32, height: f32, rgb: (u8, u8, u8)) {
        let (left, right) = (x, x + width);
        let (top, bottom) = (PAGE_HEIGHT - y, PAGE_HEIGHT - y - height);
        self.layer.set_fill_color(color(rgb));
        self.layer.add_polygon(Polygon {
            rings: vec![vec![
                (Point::new(Mm(left), Mm(bottom)), false),
                (Point::new(Mm(right), Mm(bottom)), false),
                (Point::new(Mm(right), Mm(top)), false),
                (Point::new(Mm(left), Mm(top)), false),
            ]],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    fn hline(&self, x1: f32, x2: f32, y: f32, rgb: (u8, u8, u8)) {
        self.layer.set_outline_color(color(rgb));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(PAGE_HEIGHT - y)), false),
                (Point::new(Mm(x2), Mm(PAGE_HEIGHT - y)), false),
            ],
            is_closed: false,
        });
    }

    /// Place an image with its top-left corner at (x, y), scaled to `width`
    fn image(&self, image: &ImageXObject, x: f32, y: f32, width: f32) {
        let (px_width, px_height) = (image.width.0 as f32, image.height.0 as f32);
        let height = width * px_height / px_width;
        Image::from(image.clone()).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(PAGE_HEIGHT - y - height)),
                dpi: Some(px_width * 25.4 / width),
                ..Default::default()
            },
        );
    }

    /// Wrapped paragraph; returns the y below its last line
    fn paragraph(&self, text: &str, y: f32, font: &IndirectFontRef, rgb: (u8, u8, u8)) -> f32 {
        let mut y = y;
        for line in wrap_text(text, BODY_WRAP) {
            self.text(&line, BODY_SIZE, MARGIN, y, font, rgb);
            y += LINE_HEIGHT;
        }
        y
    }
}

/// Builds the report for one inventory
pub struct ReportBuilder {
    doc: PdfDocumentReference,
    title: String,
    fonts: Fonts,
    artwork: Artwork,
    first_page: Option<(PdfPageIndex, PdfLayerIndex)>,
}

impl ReportBuilder {
    pub fn new(title: &str, resource_dir: &Path) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(
            format!("{} asset inventory", title),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Layer 1",
        );
        let fonts = Fonts::load(&doc, resource_dir)?;
        let artwork = Artwork::load(resource_dir)?;
        Ok(Self {
            doc,
            title: title.to_string(),
            fonts,
            artwork,
            first_page: Some((page, layer)),
        })
    }

    fn new_page(&mut self) -> Canvas {
        let (page, layer) = self.first_page.take().unwrap_or_else(|| {
            self.doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1")
        });
        Canvas {
            layer: self.doc.get_page(page).get_layer(layer),
        }
    }

    /// Crimson cover with the inventory name and report month
    pub fn add_title_page(&mut self, date: NaiveDate) {
        let canvas = self.new_page();
        canvas.rect(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT, CRIMSON);
        if let Some(footer) = &self.artwork.footer {
            canvas.image(footer, 0.0, 180.0, 240.0);
        }
        if let Some(logo) = &self.artwork.white_logo {
            canvas.image(logo, LOGO_X, LOGO_Y, LOGO_WIDTH);
        }

        let name: String = self.title.chars().take(TITLE_MAX_CHARS).collect();
        let month = date.format("%B %Y").to_string();
        canvas.text("Bit Discovery Asset Inventory", 29.0, 30.0, 80.0, &self.fonts.regular, PALE_PINK);
        canvas.text(&name, 46.0, 30.0, 100.0, &self.fonts.regular, WHITE);
        let x = PAGE_WIDTH - MARGIN - text_width(&month, 18.0);
        canvas.text(&month, 18.0, x, 270.0, &self.fonts.regular, PALE_PINK);
    }

    /// Page with one large total, e.g. "1,234 Assets"
    pub fn add_count_page(&mut self, page: &CountPage, count: u64) {
        let canvas = self.new_page();
        let label = capitalize(page.name);
        let fonts = &self.fonts;

        canvas.text(&format!("Total {}s", label), 29.0, MARGIN, 20.0, &fonts.regular, BLACK);
        canvas.text(
            &format!(
                "The total number of {}s across all of {}'s domain names.",
                page.name, self.title
            ),
            BODY_SIZE,
            MARGIN,
            30.0,
            &fonts.regular,
            BLACK,
        );

        canvas.centered_text(&format_count_with_separator(count), 75.0, 140.0, &fonts.bold, BLACK);
        let unit = if count == 1 { label.clone() } else { format!("{}s", label) };
        canvas.centered_text(&unit, 46.0, 165.0, &fonts.regular, BLACK);

        canvas.text(&format!("{} Definition", label), BODY_SIZE, MARGIN, 220.0, &fonts.bold, BLACK);
        canvas.paragraph(page.definition, 227.0, &fonts.regular, BLACK);
    }

    /// Page with a description, bar chart and count/percent table
    pub fn add_graph_page(&mut self, page: &GraphPage, data: &[AggregationRow], total: u64) {
        let mut canvas = self.new_page();
        if let Some(logo) = &self.artwork.blue_logo {
            canvas.image(logo, LOGO_X, LOGO_Y, LOGO_WIDTH);
        }
        canvas.text(page.title, 29.0, MARGIN, 20.0, &self.fonts.regular, SLATE);
        let y = canvas.paragraph(page.description, 32.0, &self.fonts.regular, SLATE);

        let rows = build_table_rows(data, total);
        if rows.is_empty() {
            canvas.text("No data found.", BODY_SIZE, MARGIN, y + LINE_HEIGHT, &self.fonts.regular, SLATE);
            return;
        }

        let mut y = self.draw_chart(&canvas, &bar_values(data), y + LINE_HEIGHT);
        y = self.draw_header(&canvas, page.title, y + LINE_HEIGHT);
        for (i, row) in rows.iter().enumerate() {
            if y + ROW_HEIGHT > PAGE_HEIGHT - BOTTOM_MARGIN {
                canvas = self.new_page();
                y = self.draw_header(&canvas, page.title, 20.0);
            }
            y = self.draw_row(&canvas, row, i % 2 == 1, y);
        }
    }

    /// Bars scaled to the largest value with light quarter gridlines
    fn draw_chart(&self, canvas: &Canvas, values: &[u64], y: f32) -> f32 {
        let left = MARGIN + 12.0;
        let right = PAGE_WIDTH - MARGIN;
        let bottom = y + CHART_HEIGHT;

        canvas.text("Assets", 9.0, MARGIN, y + CHART_HEIGHT / 2.0, &self.fonts.regular, SLATE);
        for quarter in 0..=4 {
            let line_y = bottom - CHART_HEIGHT * quarter as f32 / 4.0;
            canvas.hline(left, right, line_y, GRID);
        }

        let max = values.iter().copied().max().unwrap_or(0);
        if max > 0 {
            let slot = (right - left) / values.len() as f32;
            for (i, value) in values.iter().enumerate() {
                let height = CHART_HEIGHT * (*value as f32 / max as f32);
                let x = left + slot * i as f32 + slot * 0.1;
                canvas.rect(x, bottom - height, slot * 0.8, height, BAR_COLORS[i % BAR_COLORS.len()]);
            }
        }
        bottom
    }

    fn draw_header(&self, canvas: &Canvas, title: &str, y: f32) -> f32 {
        canvas.rect(MARGIN, y, PAGE_WIDTH - 2.0 * MARGIN, ROW_HEIGHT, HEADER_FILL);
        let baseline = y + ROW_HEIGHT - 1.5;
        let font = &self.fonts.bold;
        canvas.text(title, 10.0, MARGIN + 1.0, baseline, font, SLATE);
        canvas.text("Count", 10.0, MARGIN + NAME_COLUMN + 1.0, baseline, font, SLATE);
        canvas.text("Percent", 10.0, MARGIN + NAME_COLUMN + COUNT_COLUMN + 1.0, baseline, font, SLATE);
        y + ROW_HEIGHT
    }

    fn draw_row(&self, canvas: &Canvas, row: &TableRow, striped: bool, y: f32) -> f32 {
        if striped {
            canvas.rect(MARGIN, y, PAGE_WIDTH - 2.0 * MARGIN, ROW_HEIGHT, STRIPE_FILL);
        }
        let baseline = y + ROW_HEIGHT - 1.5;
        let font = &self.fonts.regular;
        // Table names run longer than the column at body size
        canvas.text(&row.name, 7.0, MARGIN + 1.0, baseline, font, SLATE);
        canvas.text(&row.count.to_string(), 10.0, MARGIN + NAME_COLUMN + 1.0, baseline, font, SLATE);
        canvas.text(
            &format!("{}%", row.percent),
            10.0,
            MARGIN + NAME_COLUMN + COUNT_COLUMN + 1.0,
            baseline,
            font,
            SLATE,
        );
        y + ROW_HEIGHT
    }

    /// Write the document to `path`.
    ///
    /// The PDF is rendered into a temporary file in the same directory and
    /// renamed into place, so a failed run leaves no partial report.
    pub fn save(self, path: &Path) -> Result<PathBuf> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        let file = temp
            .reopen()
            .context("Failed to open temporary report file")?;
        let mut writer = BufWriter::new(file);
        self.doc
            .save(&mut writer)
            .map_err(|e| anyhow::anyhow!("Failed to render PDF: {}", e))?;
        writer.flush().context("Failed to flush report")?;

        temp.persist(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{report_filename, ASSET_PAGE, PAGES};
    use tempfile::TempDir;

    fn row(name: &str, value: u64) -> AggregationRow {
        AggregationRow {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("subdomain"), "Subdomain");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_text_width_grows_with_length() {
        assert!(text_width("1,000", 75.0) > text_width("1", 75.0));
        assert_eq!(text_width("", 12.0), 0.0);
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        use printpdf::image_crate::codecs::png::PngEncoder;
        use printpdf::image_crate::{ColorType, ImageEncoder};

        let pixels = vec![0x3Cu8; (width * height * 3) as usize];
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(&pixels, width, height, ColorType::Rgb8)
            .unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_load_png_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_png(&dir.path().join(BLUE_LOGO_FILE)).unwrap().is_none());
    }

    #[test]
    fn test_load_png_decodes_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(WHITE_LOGO_FILE);
        write_png(&path, 4, 2);

        let image = load_png(&path).unwrap().unwrap();
        assert_eq!(image.width.0, 4);
        assert_eq!(image.height.0, 2);
    }

    #[test]
    fn test_corrupt_image_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(FOOTER_IMAGE_FILE), b"not a png").unwrap();
        assert!(ReportBuilder::new("Acme", dir.path()).is_err());
    }

    fn render_short_report(resource_dir: &Path, out: &Path) -> Vec<u8> {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut builder = ReportBuilder::new("Acme", resource_dir).unwrap();
        builder.add_title_page(date);
        builder.add_graph_page(&PAGES[0], &[row("443", 10)], 10);
        let path = builder.save(out).unwrap();
        std::fs::read(path).unwrap()
    }

    #[test]
    fn test_render_report_with_artwork() {
        let plain = TempDir::new().unwrap();
        let branded = TempDir::new().unwrap();
        write_png(&branded.path().join(FOOTER_IMAGE_FILE), 24, 8);
        write_png(&branded.path().join(WHITE_LOGO_FILE), 6, 2);
        write_png(&branded.path().join(BLUE_LOGO_FILE), 6, 2);

        let builder = ReportBuilder::new("Acme", branded.path()).unwrap();
        assert!(builder.artwork.footer.is_some());
        assert!(builder.artwork.white_logo.is_some());
        assert!(builder.artwork.blue_logo.is_some());

        let out = TempDir::new().unwrap();
        let without = render_short_report(plain.path(), &out.path().join("plain.pdf"));
        let with = render_short_report(branded.path(), &out.path().join("branded.pdf"));
        assert!(with.starts_with(b"%PDF"));
        assert!(with.len() > without.len());
    }

    #[test]
    fn test_render_report_with_builtin_fonts() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut builder = ReportBuilder::new("Acme Corporation Worldwide", dir.path()).unwrap();

        builder.add_title_page(date);
        builder.add_count_page(&ASSET_PAGE, 1234);
        let data: Vec<AggregationRow> = (0..80).map(|i| row(&format!("host-{}", i), i)).collect();
        builder.add_graph_page(&PAGES[0], &data, 3160);
        builder.add_graph_page(&PAGES[1], &[], 0);

        let path = dir.path().join(report_filename("Acme Corporation", date));
        builder.save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
