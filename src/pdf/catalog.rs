//! Document structure dictionaries: catalog, page tree, pages, resources and info

use log::debug;

use crate::error::PDFToolkitResult;
use crate::pdf_dictionary;
use super::schema::{TypedDictionary, TypedObject};
use super::{Document, Handle, LinkageKind};

pdf_dictionary! {
    /// Root of the document's object hierarchy
    pub struct Catalog: Catalog, type_name = "Catalog" {
        get_or_create "Pages" => pages, set_pages: PageTree;
        optional "PageLayout" => page_layout, set_page_layout: name;
        optional "PageMode" => page_mode, set_page_mode: name;
        optional "Lang" => lang, set_lang: string;
        optional "Metadata" => metadata, set_metadata: object;
    }
}

pdf_dictionary! {
    /// Interior node of the page tree
    pub struct PageTree: PageTree, type_name = "Pages", init = init_page_tree {
        required "Kids" => kids, set_kids: array;
        required "Count" => count, set_count: int;
        optional "Parent" => parent, set_parent: reference;
    }
}

pdf_dictionary! {
    /// Leaf of the page tree
    pub struct Page: Page, type_name = "Page" {
        required "Parent" => parent, set_parent: reference;
        required "MediaBox" => media_box, set_media_box: array;
        get_or_create "Resources" => resources, set_resources: Resources;
        optional "Contents" => contents, set_contents: object;
        optional "Rotate" => rotate, set_rotate: int;
    }
}

pdf_dictionary! {
    /// Named resources used by a page's content
    pub struct Resources: Resources {
        optional "Font" => fonts, set_fonts: object;
        optional "XObject" => xobjects, set_xobjects: object;
        optional "ProcSet" => proc_set, set_proc_set: array;
    }
}

pdf_dictionary! {
    /// Document information dictionary referenced from the trailer
    pub struct DocumentInfo: DocumentInfo {
        optional "Title" => title, set_title: string;
        optional "Author" => author, set_author: string;
        optional "Subject" => subject, set_subject: string;
        optional "Keywords" => keywords, set_keywords: string;
        optional "Creator" => creator, set_creator: string;
        optional "Producer" => producer, set_producer: string;
        optional "CreationDate" => creation_date, set_creation_date: string;
        optional "ModDate" => mod_date, set_mod_date: string;
        optional "Trapped" => trapped, set_trapped: name;
    }
}

fn init_page_tree(tree: &PageTree) -> PDFToolkitResult<()> {
    tree.set_kids(Vec::new())?;
    tree.set_count(0)
}

impl Catalog {
    pub fn new(document: &Document) -> PDFToolkitResult<Self> {
        Self::create(document, LinkageKind::Indirect)
    }
}

impl PageTree {
    /// Append a page, keeping `Count` and the page's `/Parent` in step
    pub fn add_page(&self, page: &Page) -> PDFToolkitResult<()> {
        // `/Parent` needs an indirect tree; fail before Kids or Count change
        self.handle().back_reference()?;
        self.kids()?.push(page.handle().clone())?;
        let count = self.count()? + 1;
        self.set_count(count)?;
        page.set_parent(self.handle())?;
        debug!("Page tree now holds {} pages", count);
        Ok(())
    }

    /// Direct children in order
    pub fn pages(&self) -> PDFToolkitResult<Vec<Page>> {
        self.kids()?
            .as_array()?
            .into_iter()
            .map(Page::from_handle)
            .collect()
    }
}

impl Page {
    /// New indirect page with the given media box
    pub fn new(document: &Document, media_box: [f64; 4]) -> PDFToolkitResult<Self> {
        let page = Self::create(document, LinkageKind::Indirect)?;
        page.set_media_box(media_box.iter().copied().map(Handle::from).collect())?;
        Ok(page)
    }
}
