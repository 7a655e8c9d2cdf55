//! Building ERP transfer documents from queue payloads
//!
//! Direct transfers and transfer requests share one document shape; only the
//! ERP operation differs. Line warehouses fall back to the header warehouses
//! when a line does not override them.

use stockpost_domain::{DocumentKind, ErpTransferDocument, ErpTransferLine, TransferPayload};

/// Build the document for one attempt at posting `payload`.
pub fn build_document(
    kind: DocumentKind,
    reference: &str,
    payload: &TransferPayload,
) -> ErpTransferDocument {
    let lines = payload
        .lines
        .iter()
        .enumerate()
        .map(|(idx, line)| ErpTransferLine {
            line_num: u32::try_from(idx).unwrap_or(u32::MAX),
            item_code: line.item_code.trim().to_string(),
            quantity: line.quantity,
            from_warehouse_code: resolve_warehouse(
                line.from_warehouse.as_deref(),
                &payload.from_warehouse,
            ),
            warehouse_code: resolve_warehouse(line.to_warehouse.as_deref(), &payload.to_warehouse),
        })
        .collect();

    ErpTransferDocument {
        kind,
        reference: reference.to_string(),
        from_warehouse: payload.from_warehouse.trim().to_string(),
        to_warehouse: payload.to_warehouse.trim().to_string(),
        doc_date: payload.doc_date,
        due_date: payload.due_date,
        comments: payload.comments.clone(),
        lines,
    }
}

/// Blank overrides count as absent.
fn resolve_warehouse(line_override: Option<&str>, header: &str) -> String {
    line_override
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| header.trim())
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use stockpost_domain::TransferLine;

    use super::*;

    fn payload() -> TransferPayload {
        TransferPayload {
            from_warehouse: "WH01".into(),
            to_warehouse: "WH02".into(),
            doc_date: NaiveDate::from_ymd_opt(2025, 4, 2),
            due_date: None,
            comments: Some("restock".into()),
            lines: vec![
                TransferLine {
                    item_code: "A-100".into(),
                    quantity: 4.0,
                    from_warehouse: None,
                    to_warehouse: None,
                },
                TransferLine {
                    item_code: "B-200".into(),
                    quantity: 1.5,
                    from_warehouse: Some("WH09".into()),
                    to_warehouse: Some("  ".into()),
                },
            ],
        }
    }

    #[test]
    fn lines_default_to_header_warehouses() {
        let doc = build_document(DocumentKind::Direct, "REF-7", &payload());

        assert_eq!(doc.lines[0].from_warehouse_code, "WH01");
        assert_eq!(doc.lines[0].warehouse_code, "WH02");
    }

    #[test]
    fn line_overrides_win_and_blank_overrides_are_ignored() {
        let doc = build_document(DocumentKind::Direct, "REF-7", &payload());

        assert_eq!(doc.lines[1].from_warehouse_code, "WH09");
        assert_eq!(doc.lines[1].warehouse_code, "WH02");
    }

    #[test]
    fn header_fields_and_numbering_are_carried_over() {
        let doc = build_document(DocumentKind::Request, "REF-8", &payload());

        assert_eq!(doc.kind, DocumentKind::Request);
        assert_eq!(doc.reference, "REF-8");
        assert_eq!(doc.doc_date, NaiveDate::from_ymd_opt(2025, 4, 2));
        assert_eq!(doc.comments.as_deref(), Some("restock"));
        assert_eq!(doc.lines.iter().map(|l| l.line_num).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(doc.lines[1].quantity, 1.5);
    }
}
